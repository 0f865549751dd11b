//! # Node Configuration
//!
//! TOML file plus environment overrides. Every field has a default, so an
//! empty file (or no file at all) yields a working development node with an
//! in-memory store and an in-memory ledger.
//!
//! ```toml
//! environment = "production"
//!
//! [server]
//! port = 8080
//!
//! [store]
//! backend = "sled"
//! path = "/var/lib/pray"
//!
//! [ledger]
//! backend = "rpc"
//! endpoint = "https://rpc.testnet.rss3.io"
//! # operator_key comes from PRAY_OPERATOR_KEY
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use pray_protocol::config as protocol;
use pray_protocol::ledger::RpcLedgerConfig;
use pray_protocol::payment::BurnCriteria;
use pray_protocol::HubConfig;

use crate::logging::LogFormat;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub metrics_port: u16,
    /// Deadline for a whole request, mint confirmation included.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            metrics_port: 9090,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
    /// How often expired rate-limit markers are swept out.
    pub purge_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: PathBuf::from("./data/pray"),
            purge_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Memory,
    Rpc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    pub endpoint: String,
    pub chain_id: u64,
    /// Hex secp256k1 key of the operator. Prefer `PRAY_OPERATOR_KEY`.
    pub operator_key: Option<String>,
    pub token_contract: Address,
    pub mint_gas_limit: u64,
    pub transfer_gas_limit: u64,
    pub poll_interval_ms: u64,
    pub rpc_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Memory,
            endpoint: protocol::DEFAULT_RPC_ENDPOINT.into(),
            chain_id: protocol::DEFAULT_CHAIN_ID,
            operator_key: None,
            token_contract: protocol::TOKEN_CONTRACT,
            mint_gas_limit: protocol::MINT_GAS_LIMIT,
            transfer_gas_limit: protocol::TRANSFER_GAS_LIMIT,
            poll_interval_ms: protocol::RECEIPT_POLL_INTERVAL.as_millis() as u64,
            rpc_timeout_secs: 10,
        }
    }
}

/// Amounts in whole tokens (or thousandths, for the faucet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubSection {
    pub knock_cooldown_secs: u64,
    pub base_mint_units: u64,
    pub boost_min_units: u64,
    pub boost_max_units: u64,
    pub peek_price_units: u64,
    pub faucet_milli_units: u64,
    pub max_note_length: usize,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            knock_cooldown_secs: protocol::KNOCK_COOLDOWN.as_secs(),
            base_mint_units: protocol::BASE_MINT_UNITS,
            boost_min_units: protocol::BOOST_MIN_UNITS,
            boost_max_units: protocol::BOOST_MAX_UNITS,
            peek_price_units: protocol::PEEK_PRICE_UNITS,
            faucet_milli_units: protocol::FAUCET_MILLI_UNITS,
            max_note_length: protocol::MAX_NOTE_LENGTH,
        }
    }
}

// ---------------------------------------------------------------------------
// NodeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub ledger: LedgerConfig,
    pub hub: HubSection,
}

impl NodeConfig {
    /// Reads `path` if given, otherwise starts from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Rejects configurations the node cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ledger.backend == LedgerBackend::Rpc {
            match self.ledger.operator_key.as_deref() {
                None | Some("") => bail!("the rpc ledger needs an operator key (PRAY_OPERATOR_KEY)"),
                Some(_) => {}
            }
            if self.ledger.endpoint.trim().is_empty() {
                bail!("the rpc ledger needs an endpoint");
            }
        }
        if self.store.purge_interval_secs == 0 {
            bail!("store.purge_interval_secs must be positive");
        }
        if self.ledger.poll_interval_ms == 0 {
            bail!("ledger.poll_interval_ms must be positive");
        }

        let hub = &self.hub;
        if hub.knock_cooldown_secs == 0 {
            bail!("hub.knock_cooldown_secs must be positive");
        }
        if hub.base_mint_units == 0 || hub.boost_min_units == 0 {
            bail!("mint amounts must be positive");
        }
        if hub.boost_min_units > hub.boost_max_units {
            bail!(
                "hub.boost_min_units ({}) exceeds hub.boost_max_units ({})",
                hub.boost_min_units,
                hub.boost_max_units
            );
        }
        if hub.peek_price_units == 0 || hub.faucet_milli_units == 0 {
            bail!("peek price and faucet amount must be positive");
        }
        if hub.max_note_length == 0 {
            bail!("hub.max_note_length must be positive");
        }
        if self.server.request_timeout_secs == 0 {
            bail!("server.request_timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn log_format(&self) -> LogFormat {
        match self.environment {
            Environment::Development => LogFormat::Pretty,
            Environment::Production => LogFormat::Json,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn store_purge_interval(&self) -> Duration {
        Duration::from_secs(self.store.purge_interval_secs)
    }

    pub fn hub_config(&self) -> HubConfig {
        let h = &self.hub;
        HubConfig {
            knock_cooldown: Duration::from_secs(h.knock_cooldown_secs),
            token_unit: protocol::unit(),
            base_mint_units: h.base_mint_units,
            boost_min_units: h.boost_min_units,
            boost_max_units: h.boost_max_units,
            peek_price: protocol::units(h.peek_price_units),
            faucet_amount: protocol::milli_units(h.faucet_milli_units),
            max_note_length: h.max_note_length,
            burn: BurnCriteria {
                token_contract: self.ledger.token_contract,
                ..BurnCriteria::default()
            },
        }
    }

    pub fn rpc_ledger_config(&self) -> RpcLedgerConfig {
        let l = &self.ledger;
        RpcLedgerConfig {
            endpoint: l.endpoint.clone(),
            chain_id: l.chain_id,
            token_contract: l.token_contract,
            mint_gas_limit: l.mint_gas_limit,
            transfer_gas_limit: l.transfer_gas_limit,
            poll_interval: Duration::from_millis(l.poll_interval_ms),
            request_timeout: Duration::from_secs(l.rpc_timeout_secs),
        }
    }
}
