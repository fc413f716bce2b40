//! wallet_ledger - ledger and reconciliation service
//!
//! Serves the ledger over HTTP and optionally runs the periodic
//! reconciliation sweep.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_ledger::api::{self, AppState};
use wallet_ledger::config::StoreBackend;
use wallet_ledger::jobs::{ReconciliationScheduler, ReconciliationSchedulerConfig};
use wallet_ledger::{
    db, BalanceOracle, Config, InMemoryLedgerStore, LedgerEngine, LedgerStore, MockOracle,
    PgLedgerStore, ReconciliationEngine,
};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wallet_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(
        environment = %config.environment,
        backend = ?config.store_backend,
        "Starting wallet_ledger server"
    );

    let mut pool = None;
    let store: Arc<dyn LedgerStore> = match config.store_backend {
        StoreBackend::Memory => Arc::new(InMemoryLedgerStore::with_lock_timeout(
            config.store_lock_timeout,
        )),
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for postgres"))?;

            tracing::info!("Connecting to database...");
            let pg = db::connect(url, config.database_max_connections).await?;

            if !db::check_schema(&pg).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }
            tracing::info!("Database connected successfully");

            pool = Some(pg.clone());
            Arc::new(PgLedgerStore::new(pg, config.store_lock_timeout))
        }
    };

    // No real bank or chain connector ships with the service; the mock
    // oracle acts as a sandbox counterpart
    if config.is_production() {
        tracing::warn!("Running with the sandbox balance oracle");
    }
    let sandbox = Arc::new(MockOracle::new());
    let oracle: Arc<dyn BalanceOracle> = sandbox.clone();

    let ledger = LedgerEngine::new(store.clone(), oracle.clone(), config.ledger())
        .with_gateway(sandbox.clone());
    let reconciliation = ReconciliationEngine::new(store, oracle, config.reconciliation());

    let scheduler = ReconciliationScheduler::new(
        reconciliation.clone(),
        ReconciliationSchedulerConfig {
            interval: config.reconcile_interval,
            lookback: config.reconcile_lookback,
        },
    )
    .start();

    let app = api::build_router(AppState::new(ledger, reconciliation).with_sandbox(sandbox));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    if let Some(handle) = scheduler {
        handle.abort();
    }
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
