//! # In-Process Ledger
//!
//! A [`LedgerClient`] that keeps token and native balances in memory. Used
//! by the test suites and by the node's `memory` ledger backend for local
//! development without a chain.
//!
//! ## Behaviour worth knowing
//!
//! - Balance changes land at submission time. Only receipt visibility is
//!   delayed by [`MemoryLedger::set_mining_delay`].
//! - Operator submissions read the nonce, yield to the scheduler, then
//!   commit. Two unserialized submissions therefore collide exactly the
//!   way they would against a real node: one of them is rejected.
//! - Mints and burns emit ERC-20 `Transfer` logs from the token contract.

use std::collections::HashMap;
use std::time::Duration;

use alloy_primitives::{keccak256, Address, Bytes, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::abi;
use super::{LedgerClient, LedgerError, LedgerResult, LogEntry, Receipt, ReceiptStatus, TxHash};
use crate::config;

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    fail_submissions: bool,
    revert_mints: bool,
    fail_balance_reads: bool,
    mining_delay: Duration,
}

#[derive(Debug)]
struct Pending {
    receipt: Receipt,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    token_balances: HashMap<Address, U256>,
    native_balances: HashMap<Address, U256>,
    operator_nonce: u64,
    tx_counter: u64,
    receipts: HashMap<TxHash, Pending>,
}

impl State {
    fn next_hash(&mut self, tag: &[u8]) -> TxHash {
        self.tx_counter += 1;
        let mut preimage = tag.to_vec();
        preimage.extend_from_slice(&self.tx_counter.to_be_bytes());
        keccak256(preimage)
    }
}

/// An in-memory token ledger with fault injection.
#[derive(Debug)]
pub struct MemoryLedger {
    operator: Address,
    token_contract: Address,
    state: Mutex<State>,
    faults: Mutex<Faults>,
}

impl MemoryLedger {
    /// A ledger whose token lives at the reference contract address.
    pub fn new(operator: Address) -> Self {
        Self::with_token_contract(operator, config::TOKEN_CONTRACT)
    }

    pub fn with_token_contract(operator: Address, token_contract: Address) -> Self {
        Self {
            operator,
            token_contract,
            state: Mutex::new(State::default()),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn token_contract(&self) -> Address {
        self.token_contract
    }

    // -- Inspection ---------------------------------------------------------

    /// Token balance without going through the fault-injected read path.
    pub fn balance_of(&self, holder: &Address) -> U256 {
        self.state
            .lock()
            .token_balances
            .get(holder)
            .copied()
            .unwrap_or_default()
    }

    pub fn native_balance_of(&self, holder: &Address) -> U256 {
        self.state
            .lock()
            .native_balances
            .get(holder)
            .copied()
            .unwrap_or_default()
    }

    /// Number of operator transactions accepted so far.
    pub fn operator_nonce(&self) -> u64 {
        self.state.lock().operator_nonce
    }

    // -- Setup --------------------------------------------------------------

    /// Credits tokens out of thin air. No log, no receipt.
    pub fn credit(&self, holder: Address, amount: U256) {
        let mut state = self.state.lock();
        let balance = state.token_balances.entry(holder).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Burns `amount` of `from`'s tokens the way a client paying for a peek
    /// would: a transfer to the null address, mined immediately.
    pub fn burn(&self, from: Address, amount: U256) -> LedgerResult<TxHash> {
        let mut state = self.state.lock();
        let balance = state.token_balances.get(&from).copied().unwrap_or_default();
        if balance < amount {
            return Err(LedgerError::Rejected(format!(
                "burn of {amount} exceeds balance {balance}"
            )));
        }
        state.token_balances.insert(from, balance - amount);

        let tx_hash = state.next_hash(b"burn");
        let receipt = Receipt {
            tx_hash,
            status: ReceiptStatus::Success,
            logs: vec![self.transfer_log(from, config::BURN_ADDRESS, amount)],
        };
        state.receipts.insert(
            tx_hash,
            Pending {
                receipt,
                visible_at: Instant::now(),
            },
        );
        Ok(tx_hash)
    }

    /// Stores an arbitrary mined receipt, for payment checks against
    /// hand-built logs.
    pub fn insert_receipt(&self, receipt: Receipt) {
        self.state.lock().receipts.insert(
            receipt.tx_hash,
            Pending {
                receipt,
                visible_at: Instant::now(),
            },
        );
    }

    /// The ERC-20 `Transfer(from, to, amount)` log this ledger emits.
    pub fn transfer_log(&self, from: Address, to: Address, amount: U256) -> LogEntry {
        LogEntry {
            address: self.token_contract,
            topics: vec![
                config::TRANSFER_EVENT_SIGNATURE,
                abi::address_word(&from),
                abi::address_word(&to),
            ],
            data: Bytes::from(amount.to_be_bytes::<32>().to_vec()),
        }
    }

    // -- Fault injection ----------------------------------------------------

    /// Makes every operator submission fail at the transport level.
    pub fn fail_submissions(&self, on: bool) {
        self.faults.lock().fail_submissions = on;
    }

    /// Makes mints get mined with a failure status.
    pub fn revert_mints(&self, on: bool) {
        self.faults.lock().revert_mints = on;
    }

    /// Makes [`LedgerClient::token_balance`] fail.
    pub fn fail_balance_reads(&self, on: bool) {
        self.faults.lock().fail_balance_reads = on;
    }

    /// Delays receipt visibility for subsequent submissions.
    pub fn set_mining_delay(&self, delay: Duration) {
        self.faults.lock().mining_delay = delay;
    }

    // -- Internals ----------------------------------------------------------

    /// Reads the operator nonce, yields, then commits it. A concurrent
    /// commit in between makes this one fail.
    async fn claim_nonce(&self) -> LedgerResult<u64> {
        if self.faults.lock().fail_submissions {
            return Err(LedgerError::Transport("injected submission failure".into()));
        }
        let observed = self.state.lock().operator_nonce;
        tokio::task::yield_now().await;

        let mut state = self.state.lock();
        if state.operator_nonce != observed {
            return Err(LedgerError::Rejected(format!(
                "nonce too low: {observed} already used"
            )));
        }
        state.operator_nonce += 1;
        Ok(observed)
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    fn operator(&self) -> Address {
        self.operator
    }

    async fn submit_mint(&self, to: Address, amount: U256) -> LedgerResult<TxHash> {
        let nonce = self.claim_nonce().await?;
        let faults = *self.faults.lock();

        let mut state = self.state.lock();
        let tx_hash = state.next_hash(b"mint");
        let receipt = if faults.revert_mints {
            Receipt {
                tx_hash,
                status: ReceiptStatus::Failure,
                logs: Vec::new(),
            }
        } else {
            let balance = state.token_balances.entry(to).or_default();
            *balance = balance.saturating_add(amount);
            Receipt {
                tx_hash,
                status: ReceiptStatus::Success,
                logs: vec![self.transfer_log(Address::ZERO, to, amount)],
            }
        };
        state.receipts.insert(
            tx_hash,
            Pending {
                receipt,
                visible_at: Instant::now() + faults.mining_delay,
            },
        );
        debug!(nonce, %to, %amount, %tx_hash, "memory ledger accepted mint");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx: TxHash) -> LedgerResult<Receipt> {
        loop {
            let visible_at = {
                let state = self.state.lock();
                match state.receipts.get(&tx) {
                    Some(p) if p.visible_at <= Instant::now() => return Ok(p.receipt.clone()),
                    Some(p) => Some(p.visible_at),
                    None => None,
                }
            };
            match visible_at {
                Some(at) => tokio::time::sleep_until(at).await,
                // Unknown hash: keep waiting like a node would.
                None => tokio::time::sleep(config::RECEIPT_POLL_INTERVAL).await,
            }
        }
    }

    async fn token_balance(&self, holder: Address) -> LedgerResult<U256> {
        if self.faults.lock().fail_balance_reads {
            return Err(LedgerError::Transport("injected balance read failure".into()));
        }
        Ok(self.balance_of(&holder))
    }

    async fn send_value(&self, to: Address, amount: U256) -> LedgerResult<TxHash> {
        let nonce = self.claim_nonce().await?;
        let mut state = self.state.lock();
        let balance = state.native_balances.entry(to).or_default();
        *balance = balance.saturating_add(amount);

        let tx_hash = state.next_hash(b"send");
        state.receipts.insert(
            tx_hash,
            Pending {
                receipt: Receipt {
                    tx_hash,
                    status: ReceiptStatus::Success,
                    logs: Vec::new(),
                },
                visible_at: Instant::now(),
            },
        );
        debug!(nonce, %to, %amount, %tx_hash, "memory ledger accepted transfer");
        Ok(tx_hash)
    }

    async fn fetch_receipt(&self, tx: TxHash) -> LedgerResult<Option<Receipt>> {
        let state = self.state.lock();
        Ok(state
            .receipts
            .get(&tx)
            .filter(|p| p.visible_at <= Instant::now())
            .map(|p| p.receipt.clone()))
    }
}
