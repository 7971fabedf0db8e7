use clap::Parser;
use fundflow::application::orchestrator::MovementOrchestrator;
use fundflow::infrastructure::in_memory::{
    InMemoryAccountStore, InMemoryChallengeStore, InMemoryMovementStore, InMemoryTransactionLog,
};
use fundflow::infrastructure::notifier::NoopDelivery;
use fundflow::interfaces::http;
use miette::{IntoDiagnostic, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to bind the HTTP API to
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Seconds between sweeps expiring stale OTP-pending movements
    #[arg(long, default_value_t = 30)]
    sweep_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let orchestrator = Arc::new(build_orchestrator(cli.db_path)?);

    let sweeper = orchestrator.clone();
    let sweep_interval = Duration::from_secs(cli.sweep_interval.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.expire_stale().await {
                tracing::warn!(error = %e, "expiry sweep failed");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .into_diagnostic()?;
    tracing::info!(addr = %cli.bind, "fundflow listening");
    axum::serve(listener, http::router(orchestrator))
        .await
        .into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn build_orchestrator(db_path: Option<PathBuf>) -> Result<MovementOrchestrator> {
    use fundflow::infrastructure::rocksdb::RocksDbStore;

    Ok(match db_path {
        Some(path) => {
            let store = RocksDbStore::open(path).into_diagnostic()?;
            MovementOrchestrator::new(
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store),
                Arc::new(NoopDelivery::new()),
            )
        }
        None => in_memory_orchestrator(),
    })
}

#[cfg(not(feature = "storage-rocksdb"))]
fn build_orchestrator(db_path: Option<PathBuf>) -> Result<MovementOrchestrator> {
    if db_path.is_some() {
        miette::bail!("built without the storage-rocksdb feature; --db-path is unavailable");
    }
    Ok(in_memory_orchestrator())
}

fn in_memory_orchestrator() -> MovementOrchestrator {
    MovementOrchestrator::new(
        Arc::new(InMemoryAccountStore::new()),
        Arc::new(InMemoryMovementStore::new()),
        Arc::new(InMemoryChallengeStore::new()),
        Arc::new(InMemoryTransactionLog::new()),
        Arc::new(NoopDelivery::new()),
    )
}
