//! Database migration management commands.

use clap::{Args, Subcommand};

use enrichq_core::error::AppError;
use enrichq_database::migration::run_migrations;
use enrichq_database::{DatabasePool, JobStore, PgJobStore};

use crate::output;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand
    #[command(subcommand)]
    pub command: MigrateCommand,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// Check that the database is reachable
    Check,
}

/// Execute migration commands
pub async fn execute(args: &MigrateArgs, config_path: &str) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let pool = super::connect_database(&config).await?;

    match &args.command {
        MigrateCommand::Run => {
            println!("Running database migrations...");
            run_migrations(pool.pool()).await?;
            output::print_success("All migrations applied successfully.");
        }
        MigrateCommand::Check => {
            ping(&pool).await?;
            output::print_success("Database is reachable.");
        }
    }

    pool.close().await;
    Ok(())
}

async fn ping(pool: &DatabasePool) -> Result<(), AppError> {
    let store = PgJobStore::new(pool.pool().clone());
    if store.health_check().await? {
        Ok(())
    } else {
        Err(AppError::service_unavailable("Database health check failed"))
    }
}
