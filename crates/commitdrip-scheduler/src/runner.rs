//! Job state machine.
//!
//! Drives one job from PENDING or IN_PROGRESS to a terminal status, one commit
//! at a time. Every step is persisted before the next one starts, so a restart
//! resumes from the last recorded commit.

use chrono::Utc;
use commitdrip_config::EngineConfig;
use commitdrip_core::{
    CANCELLED_REASON, CommitStatus, Job, JobId, JobStatus, Notification, NotificationKind,
    Notifier, ObjectStore,
};
use commitdrip_db::{JobRepo, JobUpdate};
use commitdrip_executor::{GitDriver, GitFailure, LocalRepo, RemoteSpec, StageOutcome, Workspace};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{RunError, RunResult};

/// Error text of a commit none of whose files exist in the working tree.
pub const NO_FILES_REASON: &str = "No files found to commit";

/// Execution settings for [`JobRunner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Parent of the per-job working directories.
    pub work_dir: PathBuf,
    pub branch: String,
    pub remote: RemoteSpec,
    pub author_name: String,
    pub author_email: String,
    /// Wall-clock length of one plan minute.
    pub delay_unit: Duration,
    /// Cancellation polling interval during a delay.
    pub cancel_poll: Duration,
}

impl RunnerConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            work_dir: config.worker.work_dir.clone(),
            branch: config.git.branch.clone(),
            remote: RemoteSpec {
                base_url: config.git.base_url.clone(),
                username: config.git.username.clone(),
                token: config.git.token.clone(),
            },
            author_name: config.git.username.clone(),
            author_email: config.git.author_email(),
            delay_unit: config.worker.delay_unit,
            cancel_poll: config.worker.cancel_poll,
        }
    }
}

/// What a call to [`JobRunner::process_job`] amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No such job; the identifier was discarded.
    Missing,
    /// The store could not be read; the job was not touched.
    Unavailable,
    /// Redelivery of a job that had already settled.
    AlreadyTerminal(JobStatus),
    /// The job reached this terminal status during the run.
    Finished(JobStatus),
    /// Shutdown interrupted a delay; the job stays IN_PROGRESS for recovery.
    Interrupted,
}

/// How the commit loop ended.
enum Flow {
    Completed,
    Cancelled,
    Interrupted,
}

enum Wait {
    Elapsed,
    Cancelled,
    Shutdown,
}

/// Executes jobs against their target repositories.
pub struct JobRunner {
    jobs: Arc<dyn JobRepo>,
    objects: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    driver: GitDriver,
    config: RunnerConfig,
    shutdown: CancellationToken,
}

impl JobRunner {
    pub fn new(
        jobs: Arc<dyn JobRepo>,
        objects: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        driver: GitDriver,
        config: RunnerConfig,
    ) -> Self {
        Self {
            jobs,
            objects,
            notifier,
            driver,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Interrupt commit delays when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Run a job to a terminal status.
    ///
    /// Never returns an error: job-level failures are recorded on the job.
    pub async fn process_job(&self, id: JobId) -> RunOutcome {
        let mut job = match self.jobs.find(id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %id, "Job not found, discarding");
                return RunOutcome::Missing;
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "Failed to load job");
                return RunOutcome::Unavailable;
            }
        };

        if job.is_terminal() {
            info!(job_id = %id, status = %job.status, "Job already settled, nothing to do");
            return RunOutcome::AlreadyTerminal(job.status);
        }

        info!(job_id = %id, repo = %job.repo, commits = job.total_commits, "Processing job");

        let mut workspace = None;
        let flow = AssertUnwindSafe(self.execute(&mut job, &mut workspace))
            .catch_unwind()
            .await;

        let outcome = match flow {
            Ok(Ok(Flow::Completed)) => self.complete(&mut job).await,
            Ok(Ok(Flow::Cancelled)) => self.settle_cancelled(&mut job).await,
            Ok(Ok(Flow::Interrupted)) => {
                info!(job_id = %id, "Shutdown during delay, leaving job for recovery");
                RunOutcome::Interrupted
            }
            Ok(Err(e)) => self.fail(&mut job, e.to_string()).await,
            Err(panic) => {
                let e = RunError::Panicked(panic_message(panic.as_ref()));
                self.fail(&mut job, e.to_string()).await
            }
        };

        self.cleanup(&job, workspace, outcome == RunOutcome::Interrupted)
            .await;
        outcome
    }

    async fn execute(&self, job: &mut Job, workspace: &mut Option<Workspace>) -> RunResult<Flow> {
        let started_at = job.started_at.unwrap_or_else(Utc::now);
        job.status = JobStatus::InProgress;
        job.started_at = Some(started_at);
        self.jobs
            .update(
                job.id,
                JobUpdate::new()
                    .status(JobStatus::InProgress)
                    .started_at(started_at),
            )
            .await?;

        let ws = workspace.insert(Workspace::prepare(&self.config.work_dir, &job.id).await?);
        self.objects
            .fetch(&job.archive_key, &ws.archive_path())
            .await?;
        let tree = ws.unpack().await?;

        let repo = LocalRepo::init(
            self.driver.clone(),
            tree,
            &self.config.remote.remote_url(&job.repo),
            &self.config.branch,
            &self.config.author_name,
            &self.config.author_email,
        )
        .await?;
        repo.sync_with_remote().await;

        for index in 0..job.commits.len() {
            if job.commits[index].status.is_terminal() {
                continue;
            }

            if self.is_cancelled(job.id).await? {
                return Ok(Flow::Cancelled);
            }

            let delay = job.commits[index].delay(self.config.delay_unit);
            if !delay.is_zero() {
                info!(
                    job_id = %job.id,
                    commit_index = index,
                    delay_secs = delay.as_secs(),
                    "Waiting before commit"
                );
                match self.wait(job.id, delay).await? {
                    Wait::Elapsed => {}
                    Wait::Cancelled => return Ok(Flow::Cancelled),
                    Wait::Shutdown => return Ok(Flow::Interrupted),
                }
                if self.is_cancelled(job.id).await? {
                    return Ok(Flow::Cancelled);
                }
            }

            self.run_commit(job, index, &repo).await?;
        }

        Ok(Flow::Completed)
    }

    async fn run_commit(&self, job: &mut Job, index: usize, repo: &LocalRepo) -> RunResult<()> {
        job.commits[index].begin();
        self.persist(job).await?;
        info!(
            job_id = %job.id,
            commit_index = index,
            message = %job.commits[index].message,
            "Executing commit"
        );

        let files = job.commits[index].files.clone();
        match repo.stage(&files).await {
            Ok(StageOutcome::Staged(_)) => {}
            Ok(StageOutcome::NothingFound) => {
                warn!(
                    job_id = %job.id,
                    commit_index = index,
                    "No listed files present, skipping commit"
                );
                job.commits[index].skip(NO_FILES_REASON);
                return self
                    .settle_commit(job, index, NotificationKind::CommitSkipped)
                    .await;
            }
            Err(e) => {
                job.commits[index].fail(failure_text(&e));
                return self
                    .settle_commit(job, index, NotificationKind::CommitFailed)
                    .await;
            }
        }

        if let Err(e) = repo.commit(&job.commits[index].message).await {
            warn!(job_id = %job.id, commit_index = index, error = %e, "Commit failed");
            job.commits[index].fail(failure_text(&e));
            return self
                .settle_commit(job, index, NotificationKind::CommitFailed)
                .await;
        }

        let report = repo.push().await;
        if report.is_success() {
            job.commits[index].complete(Utc::now());
            info!(
                job_id = %job.id,
                commit_index = index,
                strategy = report.reconcile.as_str(),
                "Commit pushed"
            );
            self.settle_commit(job, index, NotificationKind::CommitCompleted)
                .await
        } else {
            warn!(job_id = %job.id, commit_index = index, output = %report.output, "Push failed");
            job.commits[index].fail(format!("Push failed: {}", report.output));
            self.settle_commit(job, index, NotificationKind::CommitFailed)
                .await
        }
    }

    async fn settle_commit(
        &self,
        job: &mut Job,
        index: usize,
        kind: NotificationKind,
    ) -> RunResult<()> {
        self.persist(job).await?;
        self.notify(Notification::commit(kind, job, &job.commits[index]))
            .await;
        Ok(())
    }

    /// Write the commit list and its derived counter.
    async fn persist(&self, job: &mut Job) -> RunResult<()> {
        job.recompute_completed();
        self.jobs
            .update(job.id, JobUpdate::new().progress(job))
            .await?;
        Ok(())
    }

    async fn is_cancelled(&self, id: JobId) -> RunResult<bool> {
        let job = self.jobs.find(id).await?.ok_or(RunError::Vanished)?;
        Ok(job.status == JobStatus::Cancelled)
    }

    /// Sleep for `delay`, polling for cancellation and watching for shutdown.
    async fn wait(&self, id: JobId, delay: Duration) -> RunResult<Wait> {
        let deadline = Instant::now() + delay;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Wait::Elapsed);
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(Wait::Shutdown),
                _ = tokio::time::sleep(remaining.min(self.config.cancel_poll)) => {}
            }

            if Instant::now() < deadline && self.is_cancelled(id).await? {
                return Ok(Wait::Cancelled);
            }
        }
    }

    async fn complete(&self, job: &mut Job) -> RunOutcome {
        // Cancellation may have landed while the last commit was in flight.
        match self.is_cancelled(job.id).await {
            Ok(true) => return self.settle_cancelled(job).await,
            Ok(false) => {}
            Err(e) => return self.fail(job, e.to_string()).await,
        }

        let status = job.final_status();
        let finished_at = Utc::now();
        job.status = status;
        job.finished_at = Some(finished_at);
        job.recompute_completed();

        let update = JobUpdate::new()
            .status(status)
            .progress(job)
            .finished_at(finished_at);
        if let Err(e) = self.jobs.update(job.id, update).await {
            error!(job_id = %job.id, error = %e, "Failed to record job completion");
        }

        info!(
            job_id = %job.id,
            status = %status,
            completed = job.completed_commits,
            total = job.total_commits,
            "Job finished"
        );
        self.notify(Notification::job_finished(job, status)).await;
        RunOutcome::Finished(status)
    }

    /// Reconcile with a cancellation recorded out-of-band.
    ///
    /// Progress writes made after the cancel may have overwritten its SKIPPED
    /// flags, so pending commits are skipped again here.
    async fn settle_cancelled(&self, job: &mut Job) -> RunOutcome {
        match self.jobs.find(job.id).await {
            Ok(Some(stored)) => job.finished_at = stored.finished_at,
            Ok(None) => {}
            Err(e) => warn!(job_id = %job.id, error = %e, "Failed to reload cancelled job"),
        }
        job.status = JobStatus::Cancelled;

        let mut reskipped = false;
        for commit in &mut job.commits {
            if commit.status == CommitStatus::Pending {
                reskipped |= commit.skip(CANCELLED_REASON);
            }
        }
        if reskipped {
            if let Err(e) = self.persist(job).await {
                warn!(job_id = %job.id, error = %e, "Failed to record skipped commits");
            }
        }

        info!(job_id = %job.id, completed = job.completed_commits, "Job cancelled");
        self.notify(Notification::job_finished(job, JobStatus::Cancelled))
            .await;
        RunOutcome::Finished(JobStatus::Cancelled)
    }

    async fn fail(&self, job: &mut Job, message: String) -> RunOutcome {
        if let Ok(true) = self.is_cancelled(job.id).await {
            return self.settle_cancelled(job).await;
        }

        error!(job_id = %job.id, error = %message, "Job failed");

        let finished_at = Utc::now();
        for commit in &mut job.commits {
            if commit.status == CommitStatus::InProgress {
                commit.fail(message.clone());
            }
        }
        job.status = JobStatus::Failed;
        job.finished_at = Some(finished_at);
        job.error = Some(message.clone());
        job.recompute_completed();

        let update = JobUpdate::new()
            .status(JobStatus::Failed)
            .progress(job)
            .finished_at(finished_at)
            .error(message);
        if let Err(e) = self.jobs.update(job.id, update).await {
            error!(job_id = %job.id, error = %e, "Failed to record job failure");
        }

        self.notify(Notification::job_finished(job, JobStatus::Failed))
            .await;
        RunOutcome::Finished(JobStatus::Failed)
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(
                job_id = %notification.job_id,
                kind = notification.kind.as_str(),
                error = %e,
                "Notification failed"
            );
        }
    }

    async fn cleanup(&self, job: &Job, workspace: Option<Workspace>, keep_archive: bool) {
        if !keep_archive {
            if let Err(e) = self.objects.delete(&job.archive_key).await {
                warn!(job_id = %job.id, key = %job.archive_key, error = %e, "Failed to delete archive");
            }
        }
        if let Some(ws) = workspace {
            ws.remove().await;
        }
    }
}

/// Tool output for a failed git step, falling back to the failure summary.
fn failure_text(e: &GitFailure) -> String {
    if e.output.trim().is_empty() {
        e.to_string()
    } else {
        e.output.clone()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
