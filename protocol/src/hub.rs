//! # Hub Orchestrator
//!
//! The four request flows. Each is a fixed sequence of steps that stops at
//! the first failure; no step starts before the previous one has answered.
//!
//! | Flow      | Steps                                                         |
//! |-----------|---------------------------------------------------------------|
//! | knock     | cooldown → (boost + store note) → sample note → mint → balance |
//! | reply     | format → append to thread                                     |
//! | peek_note | verify burn → sample note                                     |
//! | faucet    | send native value from the operator                           |
//!
//! Collaborator errors are logged here and replaced by a [`HubError`]
//! kind. Callers never see a raw store or ledger error.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::{Address, U256};
use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config;
use crate::kv::KeyValueStore;
use crate::ledger::{LedgerClient, LedgerGateway, TxHash};
use crate::notes::{format_entry, Note, NoteError, NoteStore};
use crate::payment::{BurnCriteria, PaymentVerdict, PaymentVerifier};
use crate::random::{draw_inclusive, RandomSource};
use crate::ratelimit::RateLimiter;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Amounts, limits and addresses the hub works with. Fixed for the life of
/// a [`Hub`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// How long an address must wait between knocks.
    pub knock_cooldown: Duration,
    /// One whole token in base units.
    pub token_unit: U256,
    /// Whole tokens minted for a knock without a note.
    pub base_mint_units: u64,
    /// Inclusive range of whole tokens minted for a knock with a note.
    pub boost_min_units: u64,
    pub boost_max_units: u64,
    /// Burn required to peek, in base units.
    pub peek_price: U256,
    /// Native value sent by the faucet, in base units.
    pub faucet_amount: U256,
    /// Longest accepted note or reply, in bytes.
    pub max_note_length: usize,
    pub burn: BurnCriteria,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            knock_cooldown: config::KNOCK_COOLDOWN,
            token_unit: config::unit(),
            base_mint_units: config::BASE_MINT_UNITS,
            boost_min_units: config::BOOST_MIN_UNITS,
            boost_max_units: config::BOOST_MAX_UNITS,
            peek_price: config::units(config::PEEK_PRICE_UNITS),
            faucet_amount: config::milli_units(config::FAUCET_MILLI_UNITS),
            max_note_length: config::MAX_NOTE_LENGTH,
            burn: BurnCriteria::default(),
        }
    }
}

impl HubConfig {
    fn whole(&self, units: u64) -> U256 {
        U256::from(units).saturating_mul(self.token_unit)
    }
}

// ---------------------------------------------------------------------------
// Results and errors
// ---------------------------------------------------------------------------

/// What a successful knock produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnockReceipt {
    /// Balance after the mint, if it could be read.
    pub total_tokens: Option<U256>,
    /// Tokens minted by this knock.
    pub add_tokens: U256,
    /// Someone's note, if one could be sampled.
    pub note: Option<Note>,
    pub tx_hash: TxHash,
    /// Id of the note this knock left behind.
    pub stored_note: Option<String>,
    /// Time from mint submission to confirmation.
    pub mint_latency: Duration,
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("too many requests")]
    TooManyRequests,

    #[error("payment not found")]
    BadPayment,

    #[error("note not found: {0}")]
    NoteNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A collaborator failed at `Step`. Details are in the logs, not here.
    #[error("internal error")]
    Internal(Step),
}

/// The flow step a [`HubError::Internal`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RateLimit,
    StoreNote,
    Mint,
    AppendReply,
    SampleNote,
    FaucetTransfer,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::RateLimit => "rate limit",
            Step::StoreNote => "store note",
            Step::Mint => "mint",
            Step::AppendReply => "append reply",
            Step::SampleNote => "sample note",
            Step::FaucetTransfer => "faucet transfer",
        }
    }
}

/// Logs a collaborator failure and collapses it into [`HubError::Internal`].
fn internal(step: Step, err: impl fmt::Display) -> HubError {
    error!(step = step.as_str(), error = %err, "request failed");
    HubError::Internal(step)
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

pub struct Hub {
    notes: NoteStore,
    limiter: RateLimiter,
    gateway: LedgerGateway,
    verifier: PaymentVerifier,
    rng: Arc<dyn RandomSource>,
    config: HubConfig,
}

impl Hub {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        ledger: Arc<dyn LedgerClient>,
        rng: Arc<dyn RandomSource>,
        config: HubConfig,
    ) -> Self {
        Self {
            notes: NoteStore::new(kv.clone()),
            limiter: RateLimiter::new(kv),
            gateway: LedgerGateway::new(ledger.clone()),
            verifier: PaymentVerifier::new(ledger, config.burn),
            rng,
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn notes(&self) -> &NoteStore {
        &self.notes
    }

    pub fn operator(&self) -> Address {
        self.gateway.operator()
    }

    fn check_length(&self, what: &str, text: &str) -> Result<(), HubError> {
        if text.len() > self.config.max_note_length {
            return Err(HubError::InvalidInput(format!(
                "{what} is {} bytes, limit is {}",
                text.len(),
                self.config.max_note_length
            )));
        }
        Ok(())
    }

    /// Mints to `address`, more if it leaves a note, and hands back a note
    /// someone else left.
    ///
    /// The sampled note may occasionally be the caller's own, just stored.
    pub async fn knock(
        &self,
        address: Address,
        note: Option<&str>,
    ) -> Result<KnockReceipt, HubError> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        if let Some(text) = note {
            self.check_length("note", text)?;
        }

        let key = RateLimiter::knock_key(&address);
        let admitted = self
            .limiter
            .try_acquire(&key, self.config.knock_cooldown)
            .await
            .map_err(|e| internal(Step::RateLimit, e))?;
        if !admitted {
            return Err(HubError::TooManyRequests);
        }

        let (mint_units, stored_note) = match note {
            Some(text) => {
                let units = draw_inclusive(
                    self.rng.as_ref(),
                    self.config.boost_min_units,
                    self.config.boost_max_units,
                );
                let entry = format_entry(Utc::now(), &address, text);
                let stored = self
                    .notes
                    .store_note(&entry)
                    .await
                    .map_err(|e| internal(Step::StoreNote, e))?;
                (units, Some(stored.id))
            }
            None => (self.config.base_mint_units, None),
        };
        let amount = self.config.whole(mint_units);

        let sampled = match self.notes.random_note(self.rng.next_u64()).await {
            Ok(n) => Some(n),
            Err(NoteError::Empty) => None,
            Err(e) => {
                warn!(error = %e, "note sampling failed, knocking without one");
                None
            }
        };

        let started = Instant::now();
        let outcome = self
            .gateway
            .mint_and_confirm(address, amount)
            .await
            .map_err(|e| internal(Step::Mint, e))?;

        info!(
            to = %address,
            quantity = %amount,
            tx_hash = %outcome.tx_hash,
            with_note = stored_note.is_some(),
            "knock rewarded"
        );

        Ok(KnockReceipt {
            total_tokens: outcome.balance,
            add_tokens: outcome.amount,
            note: sampled,
            tx_hash: outcome.tx_hash,
            stored_note,
            mint_latency: started.elapsed(),
        })
    }

    /// Appends a reply from `address` to note `id`.
    pub async fn reply(&self, id: &str, address: Address, text: &str) -> Result<Note, HubError> {
        let id = id.trim();
        let text = text.trim();
        if id.is_empty() {
            return Err(HubError::InvalidInput("note id is required".into()));
        }
        if text.is_empty() {
            return Err(HubError::InvalidInput("reply text is required".into()));
        }
        self.check_length("reply", text)?;

        let entry = format_entry(Utc::now(), &address, text);
        match self.notes.append_reply(id, &entry).await {
            Ok(note) => {
                info!(id, from = %address, "replied to note");
                Ok(note)
            }
            Err(NoteError::NotFound(id)) => Err(HubError::NoteNotFound(id)),
            Err(e) => Err(internal(Step::AppendReply, e)),
        }
    }

    /// Shows a random note to a client who burned the peek price in `tx`.
    pub async fn peek_note(&self, address: Address, tx: TxHash) -> Result<Note, HubError> {
        info!(%tx, %address, "peek note");

        match self
            .verifier
            .verify_burn(tx, address, self.config.peek_price)
            .await
        {
            PaymentVerdict::Verified { .. } => {}
            PaymentVerdict::NotFound(reason) => {
                warn!(%tx, %address, ?reason, "payment not found");
                return Err(HubError::BadPayment);
            }
        }

        self.notes
            .random_note(self.rng.next_u64())
            .await
            .map_err(|e| internal(Step::SampleNote, e))
    }

    /// Sends the faucet amount of native currency to `address`.
    pub async fn faucet(&self, address: Address) -> Result<TxHash, HubError> {
        info!(%address, amount = %self.config.faucet_amount, "faucet request");
        self.gateway
            .send_value(address, self.config.faucet_amount)
            .await
            .map_err(|e| internal(Step::FaucetTransfer, e))
    }
}
