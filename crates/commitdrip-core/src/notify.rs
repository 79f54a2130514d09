//! Outcome notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::job::{CommitRecord, Job, JobStatus};
use crate::{JobId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CommitCompleted,
    CommitSkipped,
    CommitFailed,
    JobCompleted,
    JobFailed,
    JobCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CommitCompleted => "commit_completed",
            NotificationKind::CommitSkipped => "commit_skipped",
            NotificationKind::CommitFailed => "commit_failed",
            NotificationKind::JobCompleted => "job_completed",
            NotificationKind::JobFailed => "job_failed",
            NotificationKind::JobCancelled => "job_cancelled",
        }
    }
}

/// A single outcome report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub job_id: JobId,
    pub repo: String,
    /// Commit message, for commit-level notifications.
    pub message: Option<String>,
    pub error: Option<String>,
    /// Totals, for job-level notifications.
    pub total_commits: Option<u32>,
    pub completed_commits: Option<u32>,
}

impl Notification {
    pub fn commit(kind: NotificationKind, job: &Job, commit: &CommitRecord) -> Self {
        Self {
            kind,
            job_id: job.id,
            repo: job.repo.clone(),
            message: Some(commit.message.clone()),
            error: commit.error.clone(),
            total_commits: None,
            completed_commits: None,
        }
    }

    /// Job-level report for a job that settled on `status`.
    pub fn job_finished(job: &Job, status: JobStatus) -> Self {
        let kind = match status {
            JobStatus::Completed => NotificationKind::JobCompleted,
            JobStatus::Cancelled => NotificationKind::JobCancelled,
            _ => NotificationKind::JobFailed,
        };
        Self {
            kind,
            job_id: job.id,
            repo: job.repo.clone(),
            message: None,
            error: job.error.clone(),
            total_commits: Some(job.total_commits),
            completed_commits: Some(job.completed_commits),
        }
    }

    /// One-line human readable summary.
    pub fn subject(&self) -> String {
        let label = match self.kind {
            NotificationKind::CommitCompleted => "Commit pushed",
            NotificationKind::CommitSkipped => "Commit skipped",
            NotificationKind::CommitFailed => "Commit failed",
            NotificationKind::JobCompleted => "Job complete",
            NotificationKind::JobFailed => "Job failed",
            NotificationKind::JobCancelled => "Job cancelled",
        };
        format!("{}: {}", label, self.repo)
    }
}

/// Best-effort outcome delivery.
///
/// Callers log failures and carry on; a notification never decides a job's fate.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}
