// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # SkyBond Node
//!
//! Entry point for the `skybond-node` binary. Parses CLI arguments,
//! initializes logging and metrics, loads (or creates) the surety pool, and
//! serves the HTTP/WS API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the node
//! - `init`    — initialize data directory and generate the operator key
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod treasury;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, RwLock};

use skybond_contracts::SuretyPool;
use skybond_protocol::identity::{Address, Keypair};
use skybond_protocol::storage::SuretyDb;

use cli::{Commands, SkybondNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
/// 256 is large enough to absorb short bursts without dropping events
/// for connected WebSocket clients.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// File name of the operator's secret key inside the data directory.
const OPERATOR_KEY_FILE: &str = "operator.key";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SkybondNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full node: state store, API server, and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "skybond_node=info,skybond_contracts=info,skybond_protocol=info,tower_http=debug",
        LogFormat::Pretty,
    );

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting skybond-node"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let db = Arc::new(
        SuretyDb::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?,
    );
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Surety pool: load the snapshot or create genesis ---
    let pool = match db.load_state().context("failed to load state snapshot")? {
        Some(state) => {
            tracing::info!(
                airlines = state.airline_count(),
                flights = state.flight_count(),
                policies = state.policy_count(),
                "state snapshot loaded"
            );
            SuretyPool::from_state(state)
        }
        None => {
            let owner = operator_address(&args)?;
            let first_airline = match &args.first_airline {
                Some(addr) => addr
                    .parse::<Address>()
                    .context("invalid --first-airline address")?,
                None => bail!(
                    "empty database: pass --first-airline to create the genesis pool \
                     (run `skybond-node init` first to generate the operator key)"
                ),
            };
            let pool = SuretyPool::new(owner, first_airline);
            db.persist_state(pool.state())
                .context("failed to persist genesis state")?;
            tracing::info!(%owner, %first_airline, "genesis state created");
            pool
        }
    };

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.observe_pool(&pool);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: "devnet".to_string(),
        pool: Arc::new(RwLock::new(pool)),
        db: Arc::clone(&db),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
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
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    db.flush().context("final database flush failed")?;
    tracing::info!("skybond-node stopped");
    Ok(())
}

/// Resolves the operator (owner) address from the CLI flag or the key file.
fn operator_address(args: &cli::RunArgs) -> Result<Address> {
    let keypair = match &args.operator_key {
        Some(hex_key) => Keypair::from_hex(hex_key).context("invalid --operator-key")?,
        None => {
            let key_path = args.data_dir.join(OPERATOR_KEY_FILE);
            let hex_key = std::fs::read_to_string(&key_path).with_context(|| {
                format!(
                    "failed to read operator key from {} (run `skybond-node init` first)",
                    key_path.display()
                )
            })?;
            Keypair::from_hex(&hex_key)
                .with_context(|| format!("corrupt operator key file: {}", key_path.display()))?
        }
    };
    Ok(Address::from_public_key(&keypair.public_key()))
}

/// Initializes a new node data directory and generates the operator keypair.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("skybond_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), network = %args.network, "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    // Generate the operator keypair.
    let keypair = Keypair::generate();
    let address = Address::from_public_key(&keypair.public_key());

    // Write the secret key to a file inside the data directory.
    let key_path = data_dir.join(OPERATOR_KEY_FILE);
    std::fs::write(&key_path, hex::encode(keypair.secret_key_bytes()))
        .with_context(|| format!("failed to write operator key to {}", key_path.display()))?;

    // Restrict permissions on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(
        %address,
        key_path = %key_path.display(),
        "operator keypair generated"
    );

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Network        : {}", args.network);
    println!("  Operator key   : {}", key_path.display());
    println!("  Owner address  : {}", address);

    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.rpc_url.trim_end_matches('/'));
    let body = http_get(&url).await?;
    println!("{}", body);
    Ok(())
}

/// Minimal HTTP GET without pulling in a full HTTP client dependency.
/// Raw HTTP/1.1 over a tokio TCP stream is all the `status` command needs.
async fn http_get(url: &str) -> Result<String> {
    let parsed: url::Url = url
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid URL: {}", e))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("missing host in URL"))?;
    let port = parsed.port().unwrap_or(80);
    let path = parsed.path();

    let addr = format!("{}:{}", host, port);
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, host,
    );

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Strip HTTP headers — everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    Ok(body)
}

/// Prints version information to stdout.
fn print_version() {
    println!("skybond-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc        {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Minimal URL parser — just enough to extract host/port/path.
/// Avoids pulling in the `url` crate for a single use.
mod url {
    pub struct Url {
        host: String,
        port: Option<u16>,
        path: String,
    }

    impl Url {
        pub fn host_str(&self) -> Option<&str> {
            Some(&self.host)
        }

        pub fn port(&self) -> Option<u16> {
            self.port
        }

        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl std::str::FromStr for Url {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            // Strip scheme.
            let rest = s
                .strip_prefix("http://")
                .or_else(|| s.strip_prefix("https://"))
                .unwrap_or(s);

            let (authority, path) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, "/"),
            };

            let (host, port) = match authority.rfind(':') {
                Some(i) => {
                    let p = authority[i + 1..]
                        .parse::<u16>()
                        .map_err(|e| format!("bad port: {}", e))?;
                    (authority[..i].to_string(), Some(p))
                }
                None => (authority.to_string(), None),
            };

            Ok(Url {
                host,
                port,
                path: path.to_string(),
            })
        }
    }
}
