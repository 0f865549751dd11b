//! # Randomness Sources
//!
//! The hub makes two random choices: how many tokens a note-bearing knock
//! earns, and which stored note to show. Both go through [`RandomSource`]
//! so tests can pin them down.
//!
//! None of this needs to be cryptographically strong. A client who can
//! predict the boost wins at most five extra tokens.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A source of uniformly distributed 64-bit draws.
pub trait RandomSource: Send + Sync {
    /// Returns the next draw.
    fn next_u64(&self) -> u64;
}

/// Maps one draw from `source` onto the inclusive range `[lo, hi]`.
///
/// The modulo bias is at most `(hi - lo + 1) / 2^64`, which for the ranges
/// used here is far below anything observable.
pub fn draw_inclusive(source: &dyn RandomSource, lo: u64, hi: u64) -> u64 {
    debug_assert!(lo <= hi, "empty range [{lo}, {hi}]");
    let span = hi.saturating_sub(lo).saturating_add(1);
    lo + source.next_u64() % span
}

// ---------------------------------------------------------------------------
// SeededRandom
// ---------------------------------------------------------------------------

/// Production source: a `StdRng` behind a mutex.
///
/// The lock is held for a single `gen()` call, so contention is negligible
/// even with every request task drawing from the same instance.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Seeds from operating system entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeds deterministically. Same seed, same sequence.
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_u64(&self) -> u64 {
        self.rng.lock().gen()
    }
}

// ---------------------------------------------------------------------------
// SequenceRandom
// ---------------------------------------------------------------------------

/// Replays a fixed list of draws, wrapping around at the end.
///
/// Meant for tests and reproducible demos where "random" has to mean
/// "exactly this".
pub struct SequenceRandom {
    values: Vec<u64>,
    cursor: AtomicUsize,
}

impl SequenceRandom {
    /// Creates a source that yields `values` in order, forever.
    ///
    /// An empty list yields zeros.
    pub fn new(values: Vec<u64>) -> Self {
        Self {
            values,
            cursor: AtomicUsize::new(0),
        }
    }

    /// A source that always returns `value`.
    pub fn constant(value: u64) -> Self {
        Self::new(vec![value])
    }
}

impl RandomSource for SequenceRandom {
    fn next_u64(&self) -> u64 {
        if self.values.is_empty() {
            return 0;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.values[i % self.values.len()]
    }
}
