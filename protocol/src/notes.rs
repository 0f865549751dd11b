//! # Note Store
//!
//! Notes are what clients trade tokens for. Each one is a JSON record under
//! `note:<id>` plus an entry in the `notes` index set that random sampling
//! draws from.
//!
//! ## Invariants
//!
//! - A note's `id` and `content` never change after creation; only
//!   `replies` grows, and only at the end.
//! - The record is written before its index entry, so a sampled id always
//!   resolves to a complete note.
//! - Replies are appended with compare-and-swap. Two concurrent replies to
//!   the same note both land, in some order.

use std::sync::Arc;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::kv::{KeyValueStore, KvError};

/// Name of the set holding every note id.
pub const NOTE_INDEX: &str = "notes";

/// Upper bound on compare-and-swap attempts for one reply. Sixteen writers
/// piling onto the same note inside one round trip is already absurd.
pub const MAX_APPEND_ATTEMPTS: usize = 16;

/// Length of the author prefix embedded in entries: `0x` plus six hex digits.
const AUTHOR_PREFIX_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum NoteError {
    /// No note with this id exists.
    #[error("note not found: {0}")]
    NotFound(String),

    /// Sampling was attempted before anyone left a note.
    #[error("no notes stored yet")]
    Empty,

    #[error("storage error: {0}")]
    Storage(#[from] KvError),

    #[error("note encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Every compare-and-swap attempt lost to a concurrent writer.
    #[error("note {id} still contended after {attempts} attempts")]
    Contention { id: String, attempts: usize },
}

pub type NoteResult<T> = Result<T, NoteError>;

// ---------------------------------------------------------------------------
// Note
// ---------------------------------------------------------------------------

/// A stored note and its reply thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    /// Free text, already stamped with time and author by [`format_entry`].
    pub content: String,
    /// Replies in the order they were appended.
    #[serde(default)]
    pub replies: Vec<String>,
}

/// Formats a note or reply body the way it is stored:
/// `"2024-05-01 12:00:00 0xAbCdEf: text"`.
pub fn format_entry(at: DateTime<Utc>, author: &Address, text: &str) -> String {
    let checksummed = author.to_checksum(None);
    let prefix = &checksummed[..AUTHOR_PREFIX_LEN];
    format!("{} {}: {}", at.format("%Y-%m-%d %H:%M:%S"), prefix, text)
}

fn note_key(id: &str) -> String {
    format!("note:{id}")
}

// ---------------------------------------------------------------------------
// NoteStore
// ---------------------------------------------------------------------------

/// Note persistence on top of any [`KeyValueStore`].
#[derive(Clone)]
pub struct NoteStore {
    kv: Arc<dyn KeyValueStore>,
}

impl NoteStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Creates a note with a fresh id and no replies.
    ///
    /// The note is sample-able as soon as this returns.
    pub async fn store_note(&self, content: &str) -> NoteResult<Note> {
        let note = Note {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            replies: Vec::new(),
        };
        let encoded = serde_json::to_vec(&note)?;

        // Record first, index second.
        self.kv.set(&note_key(&note.id), &encoded).await?;
        self.kv.set_add(NOTE_INDEX, &note.id).await?;

        info!(id = %note.id, "note stored");
        Ok(note)
    }

    /// Fetches a note by id.
    pub async fn get_note(&self, id: &str) -> NoteResult<Note> {
        let raw = self
            .kv
            .get(&note_key(id))
            .await?
            .ok_or_else(|| NoteError::NotFound(id.to_string()))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Picks a note using `draw` as the entropy. Every stored note has the
    /// same chance under a uniform `draw`.
    pub async fn random_note(&self, draw: u64) -> NoteResult<Note> {
        let id = self
            .kv
            .set_random_member(NOTE_INDEX, draw)
            .await?
            .ok_or(NoteError::Empty)?;
        self.get_note(&id).await
    }

    /// Appends `reply` to the note's thread and returns the updated note.
    ///
    /// Read, append, compare-and-swap; on a lost race, start over from a
    /// fresh read. Gives up with [`NoteError::Contention`] after
    /// [`MAX_APPEND_ATTEMPTS`].
    pub async fn append_reply(&self, id: &str, reply: &str) -> NoteResult<Note> {
        let key = note_key(id);

        for attempt in 1..=MAX_APPEND_ATTEMPTS {
            let raw = self
                .kv
                .get(&key)
                .await?
                .ok_or_else(|| NoteError::NotFound(id.to_string()))?;

            let mut note: Note = serde_json::from_slice(&raw)?;
            note.replies.push(reply.to_string());
            let updated = serde_json::to_vec(&note)?;

            if self.kv.compare_and_swap(&key, &raw, &updated).await? {
                info!(id, replies = note.replies.len(), "reply appended");
                return Ok(note);
            }
            debug!(id, attempt, "reply lost compare-and-swap, retrying");
        }

        Err(NoteError::Contention {
            id: id.to_string(),
            attempts: MAX_APPEND_ATTEMPTS,
        })
    }
}
