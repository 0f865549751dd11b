//! # Ledger Gateway
//!
//! The two operator-signed actions the hub takes, with the bookkeeping each
//! one needs around the raw [`LedgerClient`] call.
//!
//! ## Mint lifecycle
//!
//! ```text
//! submit ──ok──> Submitted ──mined, status 1──> Confirmed ──> balance read
//!    │                    └──mined, status 0──> Rejected
//!    └──err───> Failed
//! ```
//!
//! Nothing is retried. A failed balance read after a confirmed mint does
//! not undo the mint; it only leaves the balance unknown.
//!
//! ## Operator serialization
//!
//! Mints and faucet transfers share one signer and one nonce sequence. A
//! single async mutex covers "read nonce, sign, broadcast" for both, and is
//! released before any confirmation wait.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{LedgerClient, LedgerError, TxHash};

/// Where a mint ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintPhase {
    Submitted,
    Confirmed,
    Rejected,
    Failed,
}

impl MintPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MintPhase::Submitted => "submitted",
            MintPhase::Confirmed => "confirmed",
            MintPhase::Rejected => "rejected",
            MintPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for MintPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintOutcome {
    pub tx_hash: TxHash,
    pub amount: U256,
    /// Recipient's balance after the mint. `None` when the follow-up read
    /// failed; the mint itself still happened.
    pub balance: Option<U256>,
}

#[derive(Debug, Error)]
pub enum MintError {
    /// The mint never made it onto the ledger.
    #[error("mint submission failed: {0}")]
    Submission(#[source] LedgerError),

    /// The mint was submitted but waiting for it failed. It may still land.
    #[error("waiting for mint {tx_hash} failed: {source}")]
    Confirmation {
        tx_hash: TxHash,
        #[source]
        source: LedgerError,
    },

    /// The mint was mined with a failure status.
    #[error("mint {0} reverted")]
    Reverted(TxHash),
}

impl MintError {
    pub fn phase(&self) -> MintPhase {
        match self {
            MintError::Submission(_) => MintPhase::Failed,
            MintError::Confirmation { .. } => MintPhase::Submitted,
            MintError::Reverted(_) => MintPhase::Rejected,
        }
    }
}

#[derive(Debug, Error)]
#[error("value transfer failed: {0}")]
pub struct TransferError(#[from] pub LedgerError);

// ---------------------------------------------------------------------------
// LedgerGateway
// ---------------------------------------------------------------------------

pub struct LedgerGateway {
    client: Arc<dyn LedgerClient>,
    /// Held across nonce read and broadcast of every operator submission.
    submit_lock: Mutex<()>,
}

impl LedgerGateway {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            submit_lock: Mutex::new(()),
        }
    }

    pub fn operator(&self) -> Address {
        self.client.operator()
    }

    /// Mints `amount` to `to` and waits until the mint is mined.
    ///
    /// Dropping the returned future while it waits abandons the wait only;
    /// an already submitted mint stays submitted.
    pub async fn mint_and_confirm(
        &self,
        to: Address,
        amount: U256,
    ) -> Result<MintOutcome, MintError> {
        let submitted = {
            let _guard = self.submit_lock.lock().await;
            self.client.submit_mint(to, amount).await
        };
        let tx_hash = submitted.map_err(|e| {
            warn!(phase = %MintPhase::Failed, %to, error = %e, "mint submission failed");
            MintError::Submission(e)
        })?;
        info!(phase = %MintPhase::Submitted, %to, %amount, %tx_hash, "mint submitted");

        let receipt = self
            .client
            .wait_for_receipt(tx_hash)
            .await
            .map_err(|source| MintError::Confirmation { tx_hash, source })?;

        if !receipt.is_success() {
            warn!(phase = %MintPhase::Rejected, %to, %tx_hash, "mint reverted");
            return Err(MintError::Reverted(tx_hash));
        }
        info!(phase = %MintPhase::Confirmed, %to, %amount, %tx_hash, "minted tokens");

        let balance = match self.client.token_balance(to).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!(%to, %tx_hash, error = %e, "balance read after mint failed");
                None
            }
        };

        Ok(MintOutcome {
            tx_hash,
            amount,
            balance,
        })
    }

    /// Sends `amount` of the native currency from the operator to `to`.
    pub async fn send_value(&self, to: Address, amount: U256) -> Result<TxHash, TransferError> {
        let _guard = self.submit_lock.lock().await;
        let tx_hash = self.client.send_value(to, amount).await?;
        info!(%to, %amount, %tx_hash, "value transfer sent");
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::units;
    use crate::ledger::MemoryLedger;
    use std::time::Duration;

    fn setup() -> (Arc<MemoryLedger>, LedgerGateway) {
        let ledger = Arc::new(MemoryLedger::new(Address::repeat_byte(0x0b)));
        let gateway = LedgerGateway::new(ledger.clone());
        (ledger, gateway)
    }

    fn alice() -> Address {
        Address::repeat_byte(0xaa)
    }

    #[tokio::test]
    async fn confirmed_mint_reports_new_balance() {
        let (ledger, gw) = setup();
        ledger.credit(alice(), units(2));

        let outcome = gw.mint_and_confirm(alice(), units(1)).await.unwrap();
        assert_eq!(outcome.amount, units(1));
        assert_eq!(outcome.balance, Some(units(3)));
    }

    #[tokio::test]
    async fn failed_balance_read_degrades_instead_of_failing() {
        let (ledger, gw) = setup();
        ledger.fail_balance_reads(true);

        let outcome = gw.mint_and_confirm(alice(), units(1)).await.unwrap();
        assert_eq!(outcome.balance, None);
        // The mint is final regardless.
        assert_eq!(ledger.balance_of(&alice()), units(1));
    }

    #[tokio::test]
    async fn submission_failure_is_reported_as_failed() {
        let (ledger, gw) = setup();
        ledger.fail_submissions(true);

        let err = gw.mint_and_confirm(alice(), units(1)).await.unwrap_err();
        assert!(matches!(err, MintError::Submission(_)));
        assert_eq!(err.phase(), MintPhase::Failed);
    }

    #[tokio::test]
    async fn reverted_mint_is_rejected() {
        let (ledger, gw) = setup();
        ledger.revert_mints(true);

        let err = gw.mint_and_confirm(alice(), units(1)).await.unwrap_err();
        assert!(matches!(err, MintError::Reverted(_)));
        assert_eq!(err.phase(), MintPhase::Rejected);
    }

    #[tokio::test]
    async fn concurrent_transfers_do_not_collide() {
        let (ledger, gw) = setup();
        let bob = Address::repeat_byte(0xbb);

        let (a, b) = tokio::join!(
            gw.send_value(alice(), units(1)),
            gw.send_value(bob, units(1))
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a, b);
        assert_eq!(ledger.operator_nonce(), 2);
        assert_eq!(ledger.native_balance_of(&alice()), units(1));
        assert_eq!(ledger.native_balance_of(&bob), units(1));
    }

    #[tokio::test]
    async fn mints_and_transfers_share_the_nonce_sequence() {
        let (ledger, gw) = setup();
        let (mint, send) = tokio::join!(
            gw.mint_and_confirm(alice(), units(1)),
            gw.send_value(alice(), units(1))
        );
        mint.unwrap();
        send.unwrap();
        assert_eq!(ledger.operator_nonce(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_wait_does_not_block_other_submissions() {
        let (ledger, gw) = setup();
        let gw = Arc::new(gw);
        ledger.set_mining_delay(Duration::from_secs(60));

        let minting = {
            let gw = gw.clone();
            tokio::spawn(async move { gw.mint_and_confirm(alice(), units(1)).await })
        };
        while ledger.operator_nonce() == 0 {
            tokio::task::yield_now().await;
        }

        let sent = tokio::time::timeout(
            Duration::from_secs(1),
            gw.send_value(Address::repeat_byte(0xbb), units(1)),
        )
        .await;
        assert!(sent.expect("transfer waited on a pending mint").is_ok());
        assert!(!minting.is_finished());

        minting.await.unwrap().unwrap();
    }
}
