//! In-process [`KeyValueStore`].
//!
//! - `DashMap` holds plain entries; every per-key operation runs under the
//!   shard lock of that key's `entry()`, which is what makes test-and-set
//!   and compare-and-swap atomic.
//! - Expiry uses `tokio::time::Instant`, so a test with a paused clock can
//!   step through a cooldown without sleeping.
//! - Sets keep insertion order in a `Vec` next to a `HashSet` for O(1)
//!   membership checks. Random picks index straight into the `Vec`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time::Instant;

use super::{pick_index, KeyValueStore, KvResult};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Debug, Default)]
struct MemberSet {
    order: Vec<String>,
    index: HashSet<String>,
}

/// Volatile key-value store. Everything is gone when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    sets: RwLock<HashMap<String, MemberSet>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries. Expired ones are not counted.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries held, expired ones included.
    pub fn stored_entries(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> KvResult<bool> {
        let now = Instant::now();
        let fresh = Entry {
            value: value.to_vec(),
            expires_at: ttl.map(|t| now + t),
        };
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut slot) => {
                if slot.get().is_live(now) {
                    return Ok(false);
                }
                slot.insert(fresh);
                Ok(true)
            }
            MapEntry::Vacant(slot) => {
                slot.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> KvResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn compare_and_swap(&self, key: &str, expected: &[u8], new: &[u8]) -> KvResult<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) && entry.value == expected => {
                entry.value = new.to_vec();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_add(&self, set: &str, member: &str) -> KvResult<bool> {
        let mut sets = self.sets.write();
        let members = sets.entry(set.to_string()).or_default();
        if !members.index.insert(member.to_string()) {
            return Ok(false);
        }
        members.order.push(member.to_string());
        Ok(true)
    }

    async fn set_random_member(&self, set: &str, draw: u64) -> KvResult<Option<String>> {
        let sets = self.sets.read();
        Ok(sets
            .get(set)
            .filter(|m| !m.order.is_empty())
            .map(|m| m.order[pick_index(draw, m.order.len())].clone()))
    }

    async fn purge_expired(&self) -> KvResult<usize> {
        let now = Instant::now();
        let mut purged = 0;
        // `retain` holds each shard's write lock, so an entry refreshed by a
        // concurrent `set_if_absent` is judged on its new expiry.
        self.entries.retain(|_, e| {
            let live = e.is_live(now);
            if !live {
                purged += 1;
            }
            live
        });
        Ok(purged)
    }
}
