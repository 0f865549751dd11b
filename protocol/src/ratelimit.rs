//! # Rate Limiter
//!
//! A cooldown gate: the first caller for a key wins and every other caller
//! is turned away until the marker expires. The whole decision is one
//! `set_if_absent` against the shared store, so two concurrent knocks from
//! the same address can never both pass.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use tracing::debug;

use crate::kv::{KeyValueStore, KvError};

/// Marker value stored under an acquired key. Only presence matters.
const MARKER: &[u8] = b"1";

/// Per-key cooldown gate backed by a [`KeyValueStore`].
#[derive(Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KeyValueStore>,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Store key for a requester's knock cooldown.
    pub fn knock_key(requester: &Address) -> String {
        format!("knock:{}", requester.to_checksum(None))
    }

    /// Attempts to take the slot for `key` for `ttl`.
    ///
    /// `Ok(true)` means the caller may proceed; `Ok(false)` means another
    /// call already holds the slot. Store failures are returned as-is and
    /// must not be read as either answer.
    pub async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let acquired = self.kv.set_if_absent(key, MARKER, Some(ttl)).await?;
        if !acquired {
            debug!(key, "cooldown active");
        }
        Ok(acquired)
    }
}
