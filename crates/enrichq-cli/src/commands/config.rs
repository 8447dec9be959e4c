//! Configuration inspection commands.

use clap::{Args, Subcommand};

use enrichq_core::error::AppError;
use enrichq_database::connection::mask_password;

use crate::output::{self, OutputFormat};

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

/// Execute config commands
pub async fn execute(
    args: &ConfigArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let mut config = super::load_config(config_path)?;
            config.database.url = mask_password(&config.database.url);
            if config.enrichment.api_key.is_some() {
                config.enrichment.api_key = Some("****".to_string());
            }

            match format {
                OutputFormat::Json => output::print_json(&config),
                OutputFormat::Table => {
                    output::print_kv("Store", &config.database.store);
                    output::print_kv("Database", &config.database.url);
                    output::print_kv("Cache", &config.cache.provider);
                    output::print_kv("Progress TTL", &format!("{}s", config.progress.ttl_seconds));
                    output::print_kv("Queue enabled", &config.queue.enabled.to_string());
                    output::print_kv("Base backoff", &format!("{}ms", config.queue.base_backoff_ms));
                    output::print_kv(
                        "Retry budget",
                        &format!(
                            "{} (elevated {})",
                            config.queue.default_max_retries, config.queue.elevated_max_retries
                        ),
                    );
                    output::print_kv("Job timeout", &format!("{}s", config.queue.job_timeout_seconds));
                    output::print_kv("Cleanup cron", &config.queue.cleanup_cron);
                    output::print_kv(
                        "Retention",
                        &format!("{} days", config.queue.cleanup_retention_days),
                    );
                    output::print_kv("Enrichment", &config.enrichment.base_url);
                    output::print_kv("Logging", &format!("{} ({})", config.logging.level, config.logging.format));
                }
            }
        }
        ConfigCommand::Validate => {
            let config = super::load_config(config_path)?;
            if !matches!(config.database.store.as_str(), "memory" | "postgres") {
                return Err(AppError::configuration(format!(
                    "Unknown database.store '{}'",
                    config.database.store
                )));
            }
            if !matches!(config.cache.provider.as_str(), "memory" | "redis") {
                return Err(AppError::configuration(format!(
                    "Unknown cache.provider '{}'",
                    config.cache.provider
                )));
            }
            output::print_success(&format!("Configuration '{config_path}' is valid"));
        }
    }

    Ok(())
}
