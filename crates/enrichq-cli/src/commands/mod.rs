//! CLI command definitions and dispatch.

pub mod config;
pub mod job;
pub mod migrate;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use enrichq_cache::{CacheManager, ProgressChannel};
use enrichq_core::config::AppConfig;
use enrichq_core::error::AppError;
use enrichq_database::{DatabasePool, JobStore, PgJobStore};

use crate::output::OutputFormat;

/// Enrichq: inspect and maintain the enrichment job queue
#[derive(Debug, Parser)]
#[command(name = "enrichq", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show one job's status and latest progress
    Status(job::StatusArgs),
    /// Count jobs per status
    Counts,
    /// Delete finished jobs past retention
    Cleanup(job::CleanupArgs),
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Status(args) => job::status(args, &self.config, self.format).await,
            Commands::Counts => job::counts(&self.config, self.format).await,
            Commands::Cleanup(args) => job::cleanup(args, &self.config, self.format).await,
            Commands::Migrate(args) => migrate::execute(args, &self.config).await,
            Commands::Config(args) => config::execute(args, &self.config, self.format).await,
        }
    }
}

/// Helper: load configuration from file
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load_from(config_path)
}

/// Helper: connect to PostgreSQL
pub async fn connect_database(config: &AppConfig) -> Result<DatabasePool, AppError> {
    DatabasePool::connect(&config.database).await
}

/// Helper: open the durable store the server writes to
///
/// An in-memory store lives inside the server process and cannot be
/// inspected from here.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn JobStore>, AppError> {
    if config.database.store != "postgres" {
        return Err(AppError::configuration(format!(
            "database.store is '{}'; the CLI needs the postgres store",
            config.database.store
        )));
    }
    let pool = connect_database(config).await?;
    Ok(Arc::new(PgJobStore::new(pool.into_pool())))
}

/// Helper: open the progress channel, `None` for a process-local cache
pub async fn open_progress(config: &AppConfig) -> Result<Option<ProgressChannel>, AppError> {
    if config.cache.provider != "redis" {
        return Ok(None);
    }
    let cache = CacheManager::new(&config.cache).await?;
    Ok(Some(ProgressChannel::new(
        cache.provider(),
        Duration::from_secs(config.progress.ttl_seconds),
    )))
}
