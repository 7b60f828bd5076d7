//! # CLI Interface
//!
//! Defines the command-line argument structure for `skybond-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use skybond_protocol::config::{DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};

/// SkyBond insurance network node.
///
/// A full node for the SkyBond flight-delay insurance network. Hosts the
/// surety pool, serves the REST/WebSocket API, persists state to disk, and
/// exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "skybond-node",
    about = "SkyBond insurance network node",
    version,
    propagate_version = true
)]
pub struct SkybondNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the SkyBond node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Initialize a new node — creates the data directory and generates
    /// the operator keypair.
    Init(InitArgs),
    /// Query the status of a running node via its RPC endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory where state and keys are stored.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "SKYBOND_DATA_DIR", default_value = "~/.skybond")]
    pub data_dir: PathBuf,

    /// Port for the REST and WebSocket API.
    #[arg(long, env = "SKYBOND_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SKYBOND_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Bech32 address of the genesis airline, required the first time the
    /// node starts with an empty database. Ignored once state exists.
    #[arg(long, env = "SKYBOND_FIRST_AIRLINE")]
    pub first_airline: Option<String>,

    /// Hex-encoded Ed25519 operator private key.
    ///
    /// If not provided, the node reads the key from the data directory.
    /// **Never pass this flag in production** — use the key file instead.
    #[arg(long, env = "SKYBOND_OPERATOR_KEY")]
    pub operator_key: Option<String>,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "SKYBOND_DATA_DIR", default_value = "~/.skybond")]
    pub data_dir: PathBuf,

    /// Network to configure for: mainnet, testnet, or devnet.
    #[arg(long, default_value = "devnet")]
    pub network: String,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// RPC endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:9850")]
    pub rpc_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        SkybondNodeCli::command().debug_assert();
    }
}
