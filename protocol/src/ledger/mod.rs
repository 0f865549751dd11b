//! # Ledger Capability
//!
//! Everything the hub needs from the chain, expressed as one trait so the
//! orchestrator never touches a concrete client.
//!
//! ```text
//! abi.rs      Selectors and word-level call-data encoding
//! signer.rs   Operator key, EIP-155 legacy transaction signing
//! rpc.rs      LedgerClient over Ethereum JSON-RPC
//! memory.rs   In-process ledger with fault injection
//! gateway.rs  Mint-and-confirm and faucet transfers, serialized per operator
//! ```
//!
//! ## Finality
//!
//! A submitted transaction cannot be taken back. Dropping a future that is
//! waiting on a receipt abandons the wait, not the transaction.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

pub mod abi;
pub mod gateway;
pub mod memory;
pub mod rpc;
pub mod signer;

pub use gateway::{LedgerGateway, MintError, MintOutcome, MintPhase, TransferError};
pub use memory::MemoryLedger;
pub use rpc::{EthRpcLedger, RpcLedgerConfig};
pub use signer::{LegacyTx, OperatorKey};

/// Transaction identifier.
pub type TxHash = B256;

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// One event emitted by a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Contract that emitted the event.
    pub address: Address,
    /// Indexed topics; the first is the event signature hash.
    pub topics: Vec<B256>,
    /// Non-indexed payload.
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Failure,
}

/// The record of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub status: ReceiptStatus,
    /// Events in emission order.
    pub logs: Vec<LogEntry>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The node could not be reached or answered with an RPC error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The operator key could not produce a signature.
    #[error("signing error: {0}")]
    Signing(String),

    /// A response did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The ledger refused the transaction (bad nonce, insufficient funds).
    #[error("transaction rejected: {0}")]
    Rejected(String),
}

impl From<jsonrpsee::core::ClientError> for LedgerError {
    fn from(e: jsonrpsee::core::ClientError) -> Self {
        LedgerError::Transport(e.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// Capability Trait
// ---------------------------------------------------------------------------

/// Operations the hub performs against the token ledger.
///
/// Every operator-signed submission (`submit_mint`, `send_value`) reads the
/// operator nonce fresh. Callers that submit concurrently must serialize
/// those calls themselves; [`LedgerGateway`] does.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Address of the operator account that signs submissions.
    fn operator(&self) -> Address;

    /// Submits `mint(to, amount)` to the token contract.
    async fn submit_mint(&self, to: Address, amount: U256) -> LedgerResult<TxHash>;

    /// Blocks until `tx` is mined and returns its receipt.
    ///
    /// There is no internal timeout; the caller's deadline is the only way
    /// out.
    async fn wait_for_receipt(&self, tx: TxHash) -> LedgerResult<Receipt>;

    /// Token balance of `holder`.
    async fn token_balance(&self, holder: Address) -> LedgerResult<U256>;

    /// Sends `amount` of the native currency from the operator to `to`.
    async fn send_value(&self, to: Address, amount: U256) -> LedgerResult<TxHash>;

    /// The receipt for `tx`, or `None` if it is unknown or not yet mined.
    async fn fetch_receipt(&self, tx: TxHash) -> LedgerResult<Option<Receipt>>;
}
