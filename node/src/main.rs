// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Pray Hub Node
//!
//! Entry point for the `pray-node` binary. Parses CLI arguments, loads the
//! configuration, wires the store and ledger backends into a [`Hub`], and
//! serves the HTTP API next to the Prometheus endpoint.
//!
//! The binary supports three subcommands:
//!
//! - `run`: start the hub
//! - `keygen`: generate an operator key
//! - `version`: print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use pray_protocol::ledger::{EthRpcLedger, MemoryLedger, OperatorKey};
use pray_protocol::{Hub, KeyValueStore, LedgerClient, MemoryStore, SeededRandom, SledStore};

use cli::{Commands, PrayNodeCli, RunArgs};
use config::{LedgerBackend, NodeConfig, StoreBackend};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PrayNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen => {
            keygen();
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Lays command-line and environment settings over the file config.
fn apply_overrides(config: &mut NodeConfig, args: RunArgs) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(port) = args.metrics_port {
        config.server.metrics_port = port;
    }
    if let Some(env) = args.environment {
        config.environment = env;
    }
    if let Some(key) = args.operator_key {
        config.ledger.operator_key = Some(key);
        config.ledger.backend = LedgerBackend::Rpc;
    }
    if let Some(endpoint) = args.ledger_endpoint {
        config.ledger.endpoint = endpoint;
    }
    if let Some(path) = args.store_path {
        config.store.path = path;
        config.store.backend = StoreBackend::Sled;
    }
}

fn open_store(config: &NodeConfig) -> Result<Arc<dyn KeyValueStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; notes are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sled => {
            let path = &config.store.path;
            std::fs::create_dir_all(path)
                .with_context(|| format!("failed to create store directory: {}", path.display()))?;
            let store = SledStore::open(path)
                .with_context(|| format!("failed to open store at {}", path.display()))?;
            tracing::info!(path = %path.display(), "store opened");
            Ok(Arc::new(store))
        }
    }
}

fn open_ledger(config: &NodeConfig) -> Result<Arc<dyn LedgerClient>> {
    let key = match config.ledger.operator_key.as_deref() {
        Some(hex) => OperatorKey::from_hex(hex).context("invalid operator key")?,
        None => OperatorKey::generate(),
    };

    match config.ledger.backend {
        LedgerBackend::Memory => {
            tracing::warn!(
                operator = %key.address(),
                "using the in-memory ledger; mints are simulated"
            );
            Ok(Arc::new(MemoryLedger::with_token_contract(
                key.address(),
                config.ledger.token_contract,
            )))
        }
        LedgerBackend::Rpc => {
            let ledger_config = config.rpc_ledger_config();
            tracing::info!(
                endpoint = %ledger_config.endpoint,
                chain_id = ledger_config.chain_id,
                operator = %key.address(),
                "connecting to ledger"
            );
            let ledger = EthRpcLedger::connect(ledger_config, key)
                .context("failed to create ledger client")?;
            Ok(Arc::new(ledger))
        }
    }
}

/// Starts the hub: API server and metrics endpoint.
async fn run_node(args: RunArgs) -> Result<()> {
    let config_path = args.config.clone();
    let mut config = NodeConfig::load(config_path.as_deref())?;
    apply_overrides(&mut config, args);

    logging::init_logging(logging::DEFAULT_FILTER, config.log_format());
    config.validate().context("invalid configuration")?;

    tracing::info!(
        environment = ?config.environment,
        port = config.server.port,
        metrics_port = config.server.metrics_port,
        store = ?config.store.backend,
        ledger = ?config.ledger.backend,
        "starting pray-node"
    );

    // --- Collaborators ---
    let store = open_store(&config)?;
    let sweep = spawn_expiry_sweep(Arc::clone(&store), config.store_purge_interval());
    let ledger = open_ledger(&config)?;
    let hub = Arc::new(Hub::new(
        store,
        ledger,
        Arc::new(SeededRandom::from_entropy()),
        config.hub_config(),
    ));

    // --- Metrics ---
    let node_metrics =
        Arc::new(NodeMetrics::new().context("failed to create prometheus registry")?);

    // --- API server ---
    let app_state = api::AppState {
        hub,
        metrics: Arc::clone(&node_metrics),
    };
    let api_router = api::create_router(app_state, config.request_timeout());
    let api_addr = format!("{}:{}", config.server.host, config.server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", config.server.host, config.server.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    sweep.abort();
    tracing::info!("pray-node stopped");
    Ok(())
}

/// Prints a fresh operator key and its address.
fn keygen() {
    print!("{}", keygen_report(&OperatorKey::generate()));
}

fn keygen_report(key: &OperatorKey) -> String {
    format!(
        "address     : {}\noperator key: {}\n\n\
         Export it as PRAY_OPERATOR_KEY and fund the address before running.\n",
        key.address(),
        key.secret_hex(),
    )
}

/// Reclaims expired rate-limit markers every `every`.
fn spawn_expiry_sweep(store: Arc<dyn KeyValueStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "expired store entries reclaimed"),
                Err(e) => tracing::warn!(error = %e, "store expiry sweep failed"),
            }
        }
    })
}

fn print_version() {
    println!("pray-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol  {}", pray_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// If a handler cannot be installed, that signal is never observed; the
/// other one still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
