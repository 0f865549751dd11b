// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Pray Protocol: Core Library
//!
//! A small reward exchange: a client *knocks*, optionally leaving a short
//! note, gets freshly minted tokens, and in return is shown a note some
//! earlier client left behind. Tokens can be burned to peek at another
//! note, and new clients can ask the faucet for a little gas money.
//!
//! ## Architecture
//!
//! Modules are listed leaves first. Each one owns exactly one concern:
//!
//! - **config**: Protocol constants: amounts, cooldowns, addresses.
//! - **random**: Injectable randomness for mint boosts and note sampling.
//! - **kv**: Key-value capability trait plus in-memory and sled stores.
//! - **notes**: The note store: write, random sample, threaded replies.
//! - **ratelimit**: Per-requester test-and-set cooldown gate.
//! - **ledger**: Ledger capability, JSON-RPC client, signer, and the
//!   gateway that mints and waits for confirmation.
//! - **payment**: Proves a burn happened by scanning receipt logs.
//! - **hub**: Orchestrates the four request flows.
//!
//! ## Design Philosophy
//!
//! 1. Collaborators (ledger, key-value store) are traits. The hub never
//!    sees a concrete client, so every flow runs against in-memory doubles.
//! 2. On-chain submissions are final. Nothing here pretends to roll back.
//! 3. Every atomic step is a single store primitive, never read-then-write.

pub mod config;
pub mod hub;
pub mod kv;
pub mod ledger;
pub mod notes;
pub mod payment;
pub mod random;
pub mod ratelimit;

pub use hub::{Hub, HubConfig, HubError, KnockReceipt, Step};
pub use kv::{KeyValueStore, KvError, MemoryStore, SledStore};
pub use ledger::{LedgerClient, LedgerError, LedgerGateway};
pub use notes::{Note, NoteError, NoteStore};
pub use payment::{BurnCriteria, PaymentVerdict, PaymentVerifier};
pub use random::{RandomSource, SeededRandom, SequenceRandom};
pub use ratelimit::RateLimiter;
