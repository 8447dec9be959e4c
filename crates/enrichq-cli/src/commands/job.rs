//! Job inspection and retention commands.

use chrono::Utc;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use enrichq_core::error::AppError;
use enrichq_entity::{Job, JobId, JobStatus, ProgressRecord};
use enrichq_worker::retention::purge_expired;

use crate::output::{self, OutputFormat};

/// Arguments for the status command
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Job id
    pub job_id: String,
}

/// Arguments for the cleanup command
#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Delete finished jobs last updated more than this many days ago
    #[arg(long, default_value_t = 7)]
    pub older_than_days: u32,

    /// List what would be deleted without deleting it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct StatusOutput<'a> {
    job: &'a Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<&'a ProgressRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress_age_ms: Option<i64>,
}

/// One row of the counts table
#[derive(Debug, Serialize, Tabled)]
pub struct StatusCount {
    /// Status name
    pub status: String,
    /// Jobs in that status
    pub count: u64,
}

#[derive(Debug, Serialize)]
struct CleanupOutput {
    older_than_days: u32,
    dry_run: bool,
    deleted_jobs: u64,
    deleted_progress: u64,
}

/// Show one job
pub async fn status(args: &StatusArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config).await?;
    let job_id = JobId::from(args.job_id.as_str());

    let job = store
        .get(&job_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Job '{job_id}' not found")))?;

    let progress = match super::open_progress(&config).await? {
        Some(channel) => channel.latest(&job_id).await?,
        None => None,
    };
    let progress_age_ms = progress.as_ref().map(|p| p.age_ms(Utc::now()));

    match format {
        OutputFormat::Json => output::print_json(&StatusOutput {
            job: &job,
            progress: progress.as_ref(),
            progress_age_ms,
        }),
        OutputFormat::Table => {
            println!("Job {}:", job.id);
            output::print_kv("Type", job.job_type.as_str());
            output::print_kv("Status", job.status.as_str());
            output::print_kv("Priority", &job.priority.to_string());
            output::print_kv(
                "Retries",
                &format!("{}/{}", job.retry_count, job.max_retries),
            );
            output::print_kv("Stalls", &job.stalled_count.to_string());
            output::print_kv("Created", &job.created_at.to_rfc3339());
            output::print_kv("Started", &output::or_dash(job.started_at.map(|t| t.to_rfc3339())));
            output::print_kv(
                "Completed",
                &output::or_dash(job.completed_at.map(|t| t.to_rfc3339())),
            );
            output::print_kv("Run at", &output::or_dash(job.run_at.map(|t| t.to_rfc3339())));
            output::print_kv("Error", &output::or_dash(job.error.as_deref()));
            output::print_kv("Last error", &output::or_dash(job.last_error.as_deref()));
            if let Some(progress) = &progress {
                output::print_kv(
                    "Progress",
                    &format!("{}% {}", progress.percentage, progress.message),
                );
                output::print_kv("Progress age", &format!("{}ms", progress_age_ms.unwrap_or(0)));
            }
        }
    }

    Ok(())
}

/// Count jobs per status
pub async fn counts(config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config).await?;
    let counts = store.count_by_status().await?;
    output::print_list(&count_rows(&counts), format);
    Ok(())
}

/// Rows for every status in lifecycle order, zero-filled.
fn count_rows(counts: &std::collections::HashMap<JobStatus, u64>) -> Vec<StatusCount> {
    JobStatus::ALL
        .iter()
        .map(|status| StatusCount {
            status: status.as_str().to_string(),
            count: counts.get(status).copied().unwrap_or(0),
        })
        .collect()
}

/// Delete finished jobs and their progress entries
pub async fn cleanup(args: &CleanupArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config).await?;

    let mut expired = Vec::new();
    let mut report = CleanupOutput {
        older_than_days: args.older_than_days,
        dry_run: args.dry_run,
        deleted_jobs: 0,
        deleted_progress: 0,
    };

    if args.dry_run {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(args.older_than_days));
        expired = store.find_older_than(cutoff, &JobStatus::TERMINAL).await?;
        report.deleted_jobs = expired.len() as u64;
    } else {
        let progress = super::open_progress(&config).await?;
        let purged = purge_expired(store.as_ref(), progress.as_ref(), args.older_than_days).await?;
        report.deleted_jobs = purged.deleted_jobs;
        report.deleted_progress = purged.deleted_progress;
    }

    match format {
        OutputFormat::Json => output::print_json(&report),
        OutputFormat::Table if args.dry_run => {
            for job_id in &expired {
                println!("  {job_id}");
            }
            output::print_success(&format!(
                "{} job(s) older than {} day(s) would be deleted",
                report.deleted_jobs, args.older_than_days
            ));
        }
        OutputFormat::Table => output::print_success(&format!(
            "Deleted {} job(s) and {} progress entr(ies)",
            report.deleted_jobs, report.deleted_progress
        )),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_count_rows_fill_missing_statuses() {
        let counts = HashMap::from([(JobStatus::Pending, 4), (JobStatus::Failed, 1)]);
        let rows = count_rows(&counts);

        assert_eq!(rows.len(), JobStatus::ALL.len());
        assert_eq!(rows[0].status, "pending");
        assert_eq!(rows[0].count, 4);
        let completed = rows.iter().find(|r| r.status == "completed").unwrap();
        assert_eq!(completed.count, 0);
    }
}
