//! Worker that pulls job identifiers from the queue and runs them.

use commitdrip_config::WorkerConfig;
use commitdrip_core::{Error, JobId, JobQueue, JobStatus};
use commitdrip_db::JobRepo;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::runner::{JobRunner, RunOutcome};

/// Dispatch timing.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Bounded wait of each pop, which also bounds shutdown latency.
    pub pop_timeout: Duration,
    /// Pause before retrying a job whose record could not be read.
    pub backoff: Duration,
    /// Pause while the queue backend is unreachable.
    pub unavailable_backoff: Duration,
}

impl From<&WorkerConfig> for DispatchConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            pop_timeout: config.pop_timeout,
            backoff: config.backoff,
            unavailable_backoff: config.unavailable_backoff,
        }
    }
}

/// A single sequential consumer. At most one job is in flight per worker.
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    jobs: Arc<dyn JobRepo>,
    runner: JobRunner,
    config: DispatchConfig,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        jobs: Arc<dyn JobRepo>,
        runner: JobRunner,
        config: DispatchConfig,
    ) -> Self {
        Self {
            queue,
            jobs,
            runner,
            config,
        }
    }

    /// Requeue jobs left IN_PROGRESS by a previous process.
    ///
    /// Jobs that cannot be requeued are run inline. Returns how many jobs were
    /// found.
    pub async fn resume_interrupted(&self) -> usize {
        let interrupted = match self.jobs.find_by_status(JobStatus::InProgress).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "Failed to scan for interrupted jobs");
                return 0;
            }
        };

        if interrupted.is_empty() {
            return 0;
        }
        info!(count = interrupted.len(), "Resuming interrupted jobs");

        for job in &interrupted {
            match self.queue.push(job.id).await {
                Ok(()) => info!(job_id = %job.id, "Requeued interrupted job"),
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Queue unavailable, running interrupted job inline");
                    self.runner.process_job(job.id).await;
                }
            }
        }

        interrupted.len()
    }

    /// Run recovery, then dispatch until `shutdown` is cancelled.
    ///
    /// Shutdown is observed between pops and between jobs. A pop in flight is
    /// allowed to finish, since an entry already removed server-side would
    /// otherwise be lost.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(pop_timeout_secs = self.config.pop_timeout.as_secs(), "Worker started");
        self.resume_interrupted().await;

        while !shutdown.is_cancelled() {
            match self.queue.blocking_pop(self.config.pop_timeout).await {
                Ok(Some(id)) => self.dispatch(id, &shutdown).await,
                Ok(None) => {}
                Err(e) => {
                    let backoff = match e {
                        Error::Queue(_) => self.config.unavailable_backoff,
                        _ => self.config.backoff,
                    };
                    warn!(error = %e, backoff_secs = backoff.as_secs(), "Queue pop failed, backing off");
                    pause(backoff, &shutdown).await;
                }
            }
        }

        info!("Worker stopped");
    }

    async fn dispatch(&self, id: JobId, shutdown: &CancellationToken) {
        info!(job_id = %id, "Dequeued job");
        if self.runner.process_job(id).await != RunOutcome::Unavailable {
            return;
        }

        // The record could not be read; hand the id back rather than drop it.
        pause(self.config.backoff, shutdown).await;
        if let Err(e) = self.queue.push(id).await {
            warn!(job_id = %id, error = %e, "Failed to requeue job");
        }
    }
}

async fn pause(duration: Duration, shutdown: &CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}
