//! Job commands: submission, inspection and cancellation.

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use commitdrip_core::{CANCELLED_REASON, Job, JobId, JobPlan, JobStatus, archive_key};
use commitdrip_executor::archive::detect_format;
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

use super::parse_id;
use crate::engine::Engine;

/// Validate a plan and archive, make sure the target repository exists, then
/// store the archive and the new PENDING job.
pub async fn accept(
    engine: &Engine,
    plan_path: &Path,
    archive_path: &Path,
    skip_repo_check: bool,
) -> Result<Job> {
    let text = tokio::fs::read_to_string(plan_path)
        .await
        .with_context(|| format!("Failed to read plan: {}", plan_path.display()))?;
    let plan = JobPlan::from_json(&text)?;

    detect_format(archive_path)
        .with_context(|| format!("Unusable archive: {}", archive_path.display()))?;
    let data = tokio::fs::read(archive_path)
        .await
        .with_context(|| format!("Failed to read archive: {}", archive_path.display()))?;

    if !skip_repo_check {
        ensure_repository(engine, &plan.repo).await?;
    }

    let id = JobId::new();
    let file_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let key = engine
        .objects
        .put(&archive_key(&id, &file_name), Bytes::from(data))
        .await?;

    let job = Job::from_plan(id, plan, key);
    engine.jobs.insert(&job).await?;
    info!(job_id = %job.id, repo = %job.repo, commits = job.total_commits, "Job accepted");
    Ok(job)
}

async fn ensure_repository(engine: &Engine, repo: &str) -> Result<()> {
    let Some(host) = engine.remote_host() else {
        warn!(repo, "No token configured; assuming the repository exists");
        return Ok(());
    };

    if host.exists(repo).await? {
        return Ok(());
    }
    info!(repo, "Repository not found, creating it");
    if !host.create(repo).await? {
        bail!("Failed to create repository: {}", repo);
    }
    Ok(())
}

pub async fn submit(
    engine: &Engine,
    plan_path: &Path,
    archive_path: &Path,
    skip_repo_check: bool,
) -> Result<()> {
    let job = accept(engine, plan_path, archive_path, skip_repo_check).await?;

    let queued = match engine.queue.push(job.id).await {
        Ok(()) => true,
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "Queue unavailable; job saved to store only");
            false
        }
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "job_id": job.id,
            "total_commits": job.total_commits,
            "queued": queued,
        }))?
    );
    Ok(())
}

/// Accept a job and drive it to completion without going through the queue.
pub async fn run(
    engine: &Engine,
    plan_path: &Path,
    archive_path: &Path,
    skip_repo_check: bool,
) -> Result<()> {
    let job = accept(engine, plan_path, archive_path, skip_repo_check).await?;
    let shutdown = crate::shutdown::install_shutdown_handler();

    let outcome = engine.runner(shutdown).process_job(job.id).await;
    info!(job_id = %job.id, outcome = ?outcome, "Run finished");

    print_job(engine, job.id).await
}

pub async fn cancel(engine: &Engine, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let job = engine.jobs.cancel(id).await?;
    let skipped = job
        .commits
        .iter()
        .filter(|c| c.error.as_deref() == Some(CANCELLED_REASON))
        .count();
    println!("Cancelled job {} ({} commits skipped)", job.id, skipped);
    Ok(())
}

pub async fn show(engine: &Engine, id: &str) -> Result<()> {
    print_job(engine, parse_id(id)?).await
}

async fn print_job(engine: &Engine, id: JobId) -> Result<()> {
    let Some(job) = engine.jobs.find(id).await? else {
        bail!("Job not found: {}", id);
    };
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

pub async fn list(engine: &Engine, status: Option<&str>, limit: i64) -> Result<()> {
    let status = status.map(str::parse::<JobStatus>).transpose()?;
    let jobs = engine.jobs.list(status, limit).await?;

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{}  {:<11}  {:>3}/{:<3}  {}  {}",
            job.id,
            job.status.as_str(),
            job.completed_commits,
            job.total_commits,
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.repo
        );
    }
    Ok(())
}
