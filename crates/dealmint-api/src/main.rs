//! `dealmint` server binary: the settlement engine over in-memory ledger and
//! store backends.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dealmint_ledger::InMemoryLedger;
use dealmint_settlement::{SettlementEngine, SystemClock};
use dealmint_store::InMemoryStore;
use dealmint_types::{constants, EngineConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = constants::DEFAULT_API_PORT, env = "DEALMINT_PORT")]
    port: u16,

    /// Path to a JSON engine configuration. Built-in defaults when absent.
    #[arg(long, env = "DEALMINT_CONFIG")]
    config: Option<PathBuf>,

    /// Seed for the in-memory ledger's signing key.
    #[arg(long, default_value = "dealmint-dev", env = "DEALMINT_LEDGER_SEED")]
    ledger_seed: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "DEALMINT_LOG_JSON")]
    log_json: bool,
}

/// Used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "dealmint=info,dealmint_api=info,dealmint_settlement=info,\
                                  dealmint_ledger=info,dealmint_store=info";

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    EngineConfig::from_json(&raw).with_context(|| format!("parsing config {}", path.display()))
}

/// Resolve when `signal` fires. A handler that failed to install is logged
/// and the server keeps running.
async fn shutdown_signal(signal: impl Future<Output = std::io::Result<()>>) {
    match signal.await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => {
            tracing::warn!(error = %e, "could not install ctrl-c handler, running until killed");
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = load_config(args.config.as_ref())?;
    let engine = SettlementEngine::new(
        Arc::new(InMemoryLedger::new(&args.ledger_seed)),
        Arc::new(InMemoryStore::new()),
        config,
        Arc::new(SystemClock),
    )?;
    let app = dealmint_api::router(Arc::new(engine));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, version = constants::VERSION, "{} listening", constants::ENGINE_NAME);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tokio::signal::ctrl_c()))
        .await
        .context("server error")?;
    Ok(())
}
