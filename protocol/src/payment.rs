//! # Payment Verifier
//!
//! A peek is paid for by burning tokens: an ERC-20 transfer from the payer
//! to the null address. The client hands over a transaction hash and the
//! verifier looks for the matching `Transfer` event in its receipt.
//!
//! A log entry is a matching burn when all of these hold:
//!
//! 1. it was emitted by the token contract;
//! 2. topic 0 is the `Transfer(address,address,uint256)` signature;
//! 3. topic 1, read as a right-aligned address, is the payer;
//! 4. topic 2, read the same way, is the burn address;
//! 5. the data, read as a big-endian integer, is exactly the price.
//!
//! Every log is checked. The matching event can sit anywhere in the
//! receipt, behind any number of unrelated ones.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use tracing::{debug, info};

use crate::config;
use crate::ledger::abi;
use crate::ledger::{LedgerClient, LogEntry, Receipt, TxHash};

/// The fixed facts a burn is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurnCriteria {
    pub token_contract: Address,
    pub transfer_signature: B256,
    pub burn_address: Address,
}

impl Default for BurnCriteria {
    fn default() -> Self {
        Self {
            token_contract: config::TOKEN_CONTRACT,
            transfer_signature: config::TRANSFER_EVENT_SIGNATURE,
            burn_address: config::BURN_ADDRESS,
        }
    }
}

/// Why no burn was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// The receipt could not be fetched at all.
    Unavailable(String),
    /// No receipt exists yet: unknown hash or not mined.
    NotMined,
    /// The receipt exists but none of its logs is the expected burn.
    NoMatchingLog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentVerdict {
    /// The burn is at `log_index` in the receipt.
    Verified { log_index: usize },
    NotFound(Reason),
}

impl PaymentVerdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, PaymentVerdict::Verified { .. })
    }
}

/// Whether `log` is a burn of exactly `amount` by `payer`.
pub fn is_matching_burn(
    log: &LogEntry,
    criteria: &BurnCriteria,
    payer: &Address,
    amount: U256,
) -> bool {
    if log.address != criteria.token_contract {
        return false;
    }
    let [signature, from, to, ..] = log.topics.as_slice() else {
        return false;
    };
    if *signature != criteria.transfer_signature
        || abi::word_address(from) != *payer
        || abi::word_address(to) != criteria.burn_address
    {
        return false;
    }
    // A uint256 is one word. Anything longer is not this event's payload,
    // even if its leading bytes happen to be zero.
    log.data.len() <= abi::WORD && U256::try_from_be_slice(&log.data) == Some(amount)
}

/// Index of the first matching burn in `receipt`, if any.
pub fn find_burn(
    receipt: &Receipt,
    criteria: &BurnCriteria,
    payer: &Address,
    amount: U256,
) -> Option<usize> {
    receipt
        .logs
        .iter()
        .position(|log| is_matching_burn(log, criteria, payer, amount))
}

/// Checks burn payments against the ledger's receipts.
pub struct PaymentVerifier {
    ledger: Arc<dyn LedgerClient>,
    criteria: BurnCriteria,
}

impl PaymentVerifier {
    pub fn new(ledger: Arc<dyn LedgerClient>, criteria: BurnCriteria) -> Self {
        Self { ledger, criteria }
    }

    pub fn criteria(&self) -> &BurnCriteria {
        &self.criteria
    }

    /// Looks for a burn of exactly `amount` by `payer` in `tx`'s receipt.
    ///
    /// Only [`PaymentVerdict::Verified`] means paid. Fetch failures come
    /// back as [`Reason::Unavailable`], never as an error the caller could
    /// mistake for success.
    pub async fn verify_burn(&self, tx: TxHash, payer: Address, amount: U256) -> PaymentVerdict {
        let receipt = match self.ledger.fetch_receipt(tx).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                debug!(%tx, "payment receipt not found");
                return PaymentVerdict::NotFound(Reason::NotMined);
            }
            Err(e) => {
                debug!(%tx, error = %e, "payment receipt unavailable");
                return PaymentVerdict::NotFound(Reason::Unavailable(e.to_string()));
            }
        };

        match find_burn(&receipt, &self.criteria, &payer, amount) {
            Some(log_index) => {
                info!(%tx, from = %payer, %amount, log_index, "found payment");
                PaymentVerdict::Verified { log_index }
            }
            None => PaymentVerdict::NotFound(Reason::NoMatchingLog),
        }
    }
}
