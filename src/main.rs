//! Enrichq server: background enrichment job queue.
//!
//! Wires the durable store, progress channel, collaborators, and the queue
//! service together, then runs until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use enrichq_cache::{CacheManager, ProgressChannel};
use enrichq_core::config::AppConfig;
use enrichq_core::error::AppError;
use enrichq_database::{DatabasePool, JobStore, MemoryJobStore, PgJobStore};
use enrichq_worker::enrichment::{HttpCandidateDirectory, HttpEnrichmentClient};
use enrichq_worker::jobs::register_default_handlers;
use enrichq_worker::{CronScheduler, JobExecutor, QueueService, QueueSettings};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load `config/default` + `config/{ENRICHQ_ENV}` + `ENRICHQ__*` variables.
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("ENRICHQ_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting enrichq v{}", env!("CARGO_PKG_VERSION"));

    // ── Durable store ────────────────────────────────────────────
    let (store, pool) = open_store(&config).await?;

    // ── Progress channel ─────────────────────────────────────────
    tracing::info!(provider = %config.cache.provider, "Initializing cache");
    let cache = CacheManager::new(&config.cache).await?;
    let progress = ProgressChannel::new(
        cache.provider(),
        Duration::from_secs(config.progress.ttl_seconds),
    );

    // ── Handlers and collaborators ───────────────────────────────
    let enrichment = Arc::new(HttpEnrichmentClient::new(&config.enrichment)?);
    let candidates = Arc::new(HttpCandidateDirectory::new(&config.enrichment)?);
    let mut executor = JobExecutor::new();
    register_default_handlers(&mut executor, enrichment, candidates);

    // ── Queue service ────────────────────────────────────────────
    let settings = QueueSettings::from_config(&config.queue);
    let service = Arc::new(QueueService::new(store, progress, executor, settings));

    if config.queue.enabled {
        service.start().await?;
    } else {
        tracing::warn!("Queue workers disabled by configuration");
    }

    let scheduler = CronScheduler::new(Arc::clone(&service)).await?;
    scheduler
        .register_cleanup(&config.queue.cleanup_cron, config.queue.cleanup_retention_days)
        .await?;
    scheduler.start().await?;

    tracing::info!("enrichq running; press Ctrl+C to stop");
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Scheduler shutdown failed");
    }
    service.shutdown().await;
    if let Some(pool) = pool {
        pool.close().await;
    }

    tracing::info!("enrichq shut down gracefully");
    Ok(())
}

/// Select the durable store backend.
async fn open_store(
    config: &AppConfig,
) -> Result<(Arc<dyn JobStore>, Option<DatabasePool>), AppError> {
    match config.database.store.as_str() {
        "postgres" => {
            let pool = DatabasePool::connect(&config.database).await?;
            if config.database.run_migrations {
                enrichq_database::migration::run_migrations(pool.pool()).await?;
            }
            let store = PgJobStore::new(pool.pool().clone());
            Ok((Arc::new(store), Some(pool)))
        }
        "memory" => {
            tracing::warn!("Using the in-memory job store; jobs do not survive a restart");
            Ok((Arc::new(MemoryJobStore::new()), None))
        }
        other => Err(AppError::configuration(format!(
            "Unknown database.store '{other}' (expected 'postgres' or 'memory')"
        ))),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
