//! # Key-Value Store Capability
//!
//! The hub keeps two kinds of shared state off-chain: notes and rate-limit
//! markers. Both live behind [`KeyValueStore`], a deliberately small set of
//! operations that any Redis-like backend can provide atomically.
//!
//! ```text
//! memory.rs      DashMap-backed store with monotonic-clock expiry
//! sled_store.rs  Durable store on sled with wall-clock expiry
//! ```
//!
//! ## Atomicity Contract
//!
//! Every method is a single atomic step against the backend. Callers build
//! read-modify-write sequences out of [`KeyValueStore::compare_and_swap`]
//! and never out of a `get` followed by a `set`.
//!
//! ## Expiry
//!
//! Only [`KeyValueStore::set_if_absent`] can attach a TTL. An expired entry
//! is indistinguishable from a missing one for every operation. It still
//! takes space until [`KeyValueStore::purge_expired`] sweeps it; the node
//! runs that sweep on a timer.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors surfaced by a key-value backend.
#[derive(Debug, Error)]
pub enum KvError {
    /// The backend itself failed (I/O, connection, poisoned state).
    #[error("backend error: {0}")]
    Backend(String),

    /// Stored bytes did not have the expected shape.
    #[error("corrupt entry: {0}")]
    Corrupt(String),
}

impl From<sled::Error> for KvError {
    fn from(e: sled::Error) -> Self {
        KvError::Backend(e.to_string())
    }
}

pub type KvResult<T> = Result<T, KvError>;

// ---------------------------------------------------------------------------
// Capability Trait
// ---------------------------------------------------------------------------

/// Atomic key-value and set operations.
///
/// Object safe, so the hub can hold an `Arc<dyn KeyValueStore>` and tests
/// can swap backends freely.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Stores `value` under `key` only if no live entry exists.
    ///
    /// Returns `true` when this call created the entry. With `ttl`, the
    /// entry disappears on its own once the TTL elapses.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Option<Duration>)
        -> KvResult<bool>;

    /// Reads the live value under `key`.
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    /// Unconditionally stores `value` under `key` with no expiry.
    async fn set(&self, key: &str, value: &[u8]) -> KvResult<()>;

    /// Replaces the value under `key` with `new` only if it currently equals
    /// `expected`.
    ///
    /// Returns `false` if the key is missing or holds something else.
    async fn compare_and_swap(&self, key: &str, expected: &[u8], new: &[u8]) -> KvResult<bool>;

    /// Adds `member` to the set named `set`. Returns `true` if it was new.
    async fn set_add(&self, set: &str, member: &str) -> KvResult<bool>;

    /// Picks one member of `set`, using `draw` as the entropy.
    ///
    /// Implementations map `draw` uniformly onto the current members, so a
    /// uniformly random `draw` gives every member the same chance. Returns
    /// `None` for an empty or unknown set.
    async fn set_random_member(&self, set: &str, draw: u64) -> KvResult<Option<String>>;

    /// Deletes every entry whose TTL has elapsed. Returns how many went.
    async fn purge_expired(&self) -> KvResult<usize>;
}

/// Index of the member picked by `draw` out of `len` members.
pub(crate) fn pick_index(draw: u64, len: usize) -> usize {
    (draw % len as u64) as usize
}

// ---------------------------------------------------------------------------
// Backend-agnostic behaviour tests
// ---------------------------------------------------------------------------
