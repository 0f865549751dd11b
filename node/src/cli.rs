//! # CLI Interface
//!
//! Command-line arguments for `pray-node`, built with `clap` derive. Three
//! subcommands: `run`, `keygen` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Environment;

/// Pray hub node.
///
/// Serves the knock, reply, peekNote and faucet endpoints, mints reward
/// tokens through the operator account, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "pray-node",
    about = "Pray-to-earn hub node",
    version,
    propagate_version = true
)]
pub struct PrayNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the hub.
    Run(RunArgs),
    /// Generate a fresh operator key and print it with its address.
    Keygen,
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand. Anything set here wins over the
/// config file.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML).
    ///
    /// When omitted, every setting takes its default.
    #[arg(long, short = 'c', env = "PRAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port for the HTTP API.
    #[arg(long, short = 'p', env = "PRAY_PORT")]
    pub port: Option<u16>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "PRAY_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Deployment environment; selects the log format.
    #[arg(long, env = "PRAY_ENVIRONMENT")]
    pub environment: Option<Environment>,

    /// Hex-encoded secp256k1 operator key.
    ///
    /// Setting it also switches the ledger to the JSON-RPC backend.
    #[arg(long, env = "PRAY_OPERATOR_KEY", hide_env_values = true)]
    pub operator_key: Option<String>,

    /// JSON-RPC endpoint of the ledger.
    #[arg(long, env = "PRAY_LEDGER_ENDPOINT")]
    pub ledger_endpoint: Option<String>,

    /// Directory of the sled store. Setting it selects the sled backend.
    #[arg(long, env = "PRAY_STORE_PATH")]
    pub store_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        PrayNodeCli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = PrayNodeCli::try_parse_from([
            "pray-node",
            "run",
            "--port",
            "9000",
            "--environment",
            "production",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.environment, Some(Environment::Production));
    }
}
