//! # SledStore: Durable Key-Value Backend
//!
//! Notes should survive a restart; rate-limit markers may as well. This
//! backend keeps both in sled's embedded B+ trees.
//!
//! ## Tree Layout
//!
//! | Tree      | Key                  | Value                               |
//! |-----------|----------------------|-------------------------------------|
//! | `entries` | key (UTF-8)          | expiry (8B BE unix ms) ‖ payload    |
//! | `sets`    | set ‖ `0x00` ‖ member | empty                              |
//!
//! An expiry of zero means "never". Wall-clock time is used because the
//! value outlives the process.
//!
//! ## Atomicity
//!
//! Test-and-set and compare-and-swap both go through sled's native
//! `compare_and_swap`, retried when an expired entry has to be displaced.
//! Nothing is ever read and then blindly written.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sled::{Db, IVec, Tree};

use super::{pick_index, KeyValueStore, KvError, KvResult};

/// Separator between a set name and its member inside the `sets` tree.
const SET_SEPARATOR: u8 = 0x00;

/// Size of the expiry header on every stored value.
const EXPIRY_HEADER_LEN: usize = 8;

/// Durable key-value store on sled.
///
/// Cheap to clone; sled handles are reference counted and thread safe.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    entries: Tree,
    sets: Tree,
}

impl SledStore {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> KvResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary store that is deleted when dropped.
    pub fn open_temporary() -> KvResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> KvResult<Self> {
        let entries = db.open_tree("entries")?;
        let sets = db.open_tree("sets")?;
        Ok(Self { db, entries, sets })
    }

    /// Number of entries on disk, expired ones included.
    pub fn stored_entries(&self) -> usize {
        self.entries.len()
    }

    /// Force pending writes to disk.
    pub fn flush(&self) -> KvResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Value envelope
// ---------------------------------------------------------------------------

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn encode_value(value: &[u8], expires_at_ms: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(EXPIRY_HEADER_LEN + value.len());
    out.extend_from_slice(&expires_at_ms.to_be_bytes());
    out.extend_from_slice(value);
    out
}

/// Splits a stored value into (expiry, payload).
fn decode_value(raw: &[u8]) -> KvResult<(u64, &[u8])> {
    if raw.len() < EXPIRY_HEADER_LEN {
        return Err(KvError::Corrupt(format!(
            "value shorter than expiry header ({} bytes)",
            raw.len()
        )));
    }
    let (header, payload) = raw.split_at(EXPIRY_HEADER_LEN);
    let mut expiry = [0u8; EXPIRY_HEADER_LEN];
    expiry.copy_from_slice(header);
    Ok((u64::from_be_bytes(expiry), payload))
}

fn is_live(expires_at_ms: u64, now_ms: u64) -> bool {
    expires_at_ms == 0 || now_ms < expires_at_ms
}

/// The live payload of a raw stored value, if any.
fn live_payload(raw: &IVec, now_ms: u64) -> KvResult<Option<&[u8]>> {
    let (expiry, payload) = decode_value(raw)?;
    Ok(is_live(expiry, now_ms).then_some(payload))
}

fn set_key(set: &str, member: &str) -> Vec<u8> {
    let mut key = set_prefix(set);
    key.extend_from_slice(member.as_bytes());
    key
}

fn set_prefix(set: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(set.len() + 1);
    prefix.extend_from_slice(set.as_bytes());
    prefix.push(SET_SEPARATOR);
    prefix
}

// ---------------------------------------------------------------------------
// KeyValueStore
// ---------------------------------------------------------------------------

#[async_trait]
impl KeyValueStore for SledStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> KvResult<bool> {
        loop {
            let now = now_millis();
            let expires_at = ttl.map_or(0, |t| now.saturating_add(t.as_millis() as u64).max(1));
            let fresh = encode_value(value, expires_at);

            let current = self.entries.get(key)?;
            if let Some(raw) = &current {
                if live_payload(raw, now)?.is_some() {
                    return Ok(false);
                }
            }

            // Either the slot is empty or it holds a dead entry. Swap against
            // exactly what we saw; if someone else got there first, look again.
            match self.entries.compare_and_swap(key, current, Some(fresh))? {
                Ok(()) => return Ok(true),
                Err(_) => continue,
            }
        }
    }

    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        match self.entries.get(key)? {
            Some(raw) => Ok(live_payload(&raw, now_millis())?.map(<[u8]>::to_vec)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> KvResult<()> {
        self.entries.insert(key, encode_value(value, 0))?;
        Ok(())
    }

    async fn compare_and_swap(&self, key: &str, expected: &[u8], new: &[u8]) -> KvResult<bool> {
        let Some(raw) = self.entries.get(key)? else {
            return Ok(false);
        };
        let (expiry, payload) = decode_value(&raw)?;
        if !is_live(expiry, now_millis()) || payload != expected {
            return Ok(false);
        }
        // Keep the existing expiry. The swap only lands if the raw bytes
        // (header included) are still what we just read.
        let replacement = encode_value(new, expiry);
        Ok(self
            .entries
            .compare_and_swap(key, Some(raw), Some(replacement))?
            .is_ok())
    }

    async fn set_add(&self, set: &str, member: &str) -> KvResult<bool> {
        let key = set_key(set, member);
        Ok(self
            .sets
            .compare_and_swap(key, None::<&[u8]>, Some(&[][..]))?
            .is_ok())
    }

    async fn set_random_member(&self, set: &str, draw: u64) -> KvResult<Option<String>> {
        let prefix = set_prefix(set);
        let len = self.sets.scan_prefix(&prefix).count();
        if len == 0 {
            return Ok(None);
        }
        // Sets only grow, so an index below a count we already observed is
        // always still present.
        let idx = pick_index(draw, len);
        match self.sets.scan_prefix(&prefix).keys().nth(idx) {
            Some(key) => {
                let key = key?;
                let member = std::str::from_utf8(&key[prefix.len()..])
                    .map_err(|e| KvError::Corrupt(format!("set member is not UTF-8: {e}")))?;
                Ok(Some(member.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn purge_expired(&self) -> KvResult<usize> {
        let now = now_millis();
        let mut purged = 0;
        for item in self.entries.iter() {
            let (key, raw) = item?;
            let (expiry, _) = decode_value(&raw)?;
            if is_live(expiry, now) {
                continue;
            }
            // Only delete what we judged expired. A marker re-acquired since
            // the scan read it has different bytes and stays.
            if self
                .entries
                .compare_and_swap(&key, Some(raw), None::<&[u8]>)?
                .is_ok()
            {
                purged += 1;
            }
        }
        Ok(purged)
    }
}
