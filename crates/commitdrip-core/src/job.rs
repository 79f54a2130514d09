//! Job and commit records.
//!
//! A job targets one remote repository and owns an ordered list of commits.
//! Both carry a status that only ever moves forward; the helpers here are the
//! single place those transitions are decided.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::plan::JobPlan;
use crate::{Error, JobId, Result};

/// Error text recorded on commits skipped by cancellation.
pub const CANCELLED_REASON: &str = "job cancelled";

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(Error::InvalidInput(format!("unknown job status: {}", other))),
        }
    }
}

/// Status of a single commit within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

impl CommitStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommitStatus::Completed | CommitStatus::Skipped | CommitStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitStatus::Pending => "pending",
            CommitStatus::InProgress => "in_progress",
            CommitStatus::Completed => "completed",
            CommitStatus::Skipped => "skipped",
            CommitStatus::Failed => "failed",
        }
    }

    /// Whether moving from `self` to `next` respects
    /// `PENDING -> IN_PROGRESS -> {COMPLETED | SKIPPED | FAILED}`.
    ///
    /// `PENDING -> SKIPPED` is allowed for cancellation, and re-entering
    /// `IN_PROGRESS` is allowed so an interrupted commit can be resumed.
    pub fn can_transition_to(&self, next: CommitStatus) -> bool {
        match self {
            CommitStatus::Pending => matches!(
                next,
                CommitStatus::InProgress | CommitStatus::Skipped
            ),
            CommitStatus::InProgress => next != CommitStatus::Pending,
            _ => false,
        }
    }
}

impl fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a job's plan together with its execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Paths to stage, relative to the working tree root.
    pub files: Vec<String>,
    pub message: String,
    /// Minutes to wait after the previous commit resolved.
    pub delay_mins: u32,
    pub status: CommitStatus,
    pub error: Option<String>,
    pub committed_at: Option<DateTime<Utc>>,
}

impl CommitRecord {
    pub fn new(files: Vec<String>, message: impl Into<String>, delay_mins: u32) -> Self {
        Self {
            files,
            message: message.into(),
            delay_mins,
            status: CommitStatus::Pending,
            error: None,
            committed_at: None,
        }
    }

    /// Delay before this commit runs, where `unit` is the length of one plan minute.
    pub fn delay(&self, unit: Duration) -> Duration {
        unit.saturating_mul(self.delay_mins)
    }

    fn transition(&mut self, next: CommitStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    pub fn begin(&mut self) -> bool {
        self.transition(CommitStatus::InProgress)
    }

    pub fn complete(&mut self, at: DateTime<Utc>) -> bool {
        let moved = self.transition(CommitStatus::Completed);
        if moved {
            self.committed_at = Some(at);
            self.error = None;
        }
        moved
    }

    pub fn skip(&mut self, reason: impl Into<String>) -> bool {
        let moved = self.transition(CommitStatus::Skipped);
        if moved {
            self.error = Some(reason.into());
        }
        moved
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        let moved = self.transition(CommitStatus::Failed);
        if moved {
            self.error = Some(error.into());
        }
        moved
    }
}

/// A unit of work targeting one remote repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Target repository as `owner/name`.
    pub repo: String,
    /// Object store key of the uploaded source archive.
    pub archive_key: String,
    pub commits: Vec<CommitRecord>,
    pub status: JobStatus,
    pub total_commits: u32,
    pub completed_commits: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Job {
    /// Build a fresh PENDING job from an accepted plan.
    pub fn from_plan(id: JobId, plan: JobPlan, archive_key: impl Into<String>) -> Self {
        let commits: Vec<CommitRecord> = plan
            .commits
            .into_iter()
            .map(|c| CommitRecord::new(c.files, c.message, c.delay_mins))
            .collect();

        Self {
            id,
            repo: plan.repo,
            archive_key: archive_key.into(),
            total_commits: commits.len() as u32,
            commits,
            status: JobStatus::Pending,
            completed_commits: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn count_with_status(&self, status: CommitStatus) -> u32 {
        self.commits.iter().filter(|c| c.status == status).count() as u32
    }

    /// Re-derive `completed_commits` from the commit list.
    pub fn recompute_completed(&mut self) -> u32 {
        self.completed_commits = self.count_with_status(CommitStatus::Completed);
        self.completed_commits
    }

    /// Status a job that ran to the end of its plan settles on.
    pub fn final_status(&self) -> JobStatus {
        if self.count_with_status(CommitStatus::Failed) == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        }
    }

    /// Cancel the job on behalf of a user request.
    ///
    /// Every commit still PENDING is flipped to SKIPPED. Terminal jobs are rejected.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.is_terminal() {
            return Err(Error::Conflict(format!(
                "cannot cancel job with status: {}",
                self.status
            )));
        }

        self.status = JobStatus::Cancelled;
        self.finished_at = Some(at);
        for commit in &mut self.commits {
            if commit.status == CommitStatus::Pending {
                commit.skip(CANCELLED_REASON);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::CommitPlan;

    fn make_job(n: usize) -> Job {
        let plan = JobPlan {
            repo: "octo/demo".to_string(),
            commits: (0..n)
                .map(|i| CommitPlan {
                    files: vec![format!("file{}.txt", i)],
                    message: format!("commit {}", i),
                    delay_mins: 0,
                })
                .collect(),
        };
        Job::from_plan(JobId::new(), plan, "jobs/x/source.zip")
    }

    #[test]
    fn test_from_plan_initial_state() {
        let job = make_job(3);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_commits, 3);
        assert_eq!(job.completed_commits, 0);
        assert!(job.commits.iter().all(|c| c.status == CommitStatus::Pending));
        assert_eq!(job.commits[2].message, "commit 2");
    }

    #[test]
    fn test_terminal_commit_never_moves() {
        let mut commit = CommitRecord::new(vec!["a".into()], "m", 0);
        assert!(commit.begin());
        assert!(commit.complete(Utc::now()));
        assert!(!commit.begin());
        assert!(!commit.fail("late"));
        assert!(!commit.skip("late"));
        assert_eq!(commit.status, CommitStatus::Completed);
        assert!(commit.error.is_none());
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut commit = CommitRecord::new(vec!["a".into()], "m", 0);
        assert!(!commit.complete(Utc::now()));
        assert_eq!(commit.status, CommitStatus::Pending);
    }

    #[test]
    fn test_in_progress_can_be_reentered() {
        let mut commit = CommitRecord::new(vec!["a".into()], "m", 0);
        assert!(commit.begin());
        assert!(commit.begin());
        assert_eq!(commit.status, CommitStatus::InProgress);
    }

    #[test]
    fn test_recompute_completed_matches_statuses() {
        let mut job = make_job(3);
        job.commits[0].begin();
        job.commits[0].complete(Utc::now());
        job.commits[1].begin();
        job.commits[1].fail("push rejected");
        assert_eq!(job.recompute_completed(), 1);
        assert_eq!(job.completed_commits, 1);
        assert_eq!(job.final_status(), JobStatus::Failed);
    }

    #[test]
    fn test_skipped_commits_do_not_fail_the_job() {
        let mut job = make_job(2);
        job.commits[0].begin();
        job.commits[0].skip("No files found to commit");
        job.commits[1].begin();
        job.commits[1].complete(Utc::now());
        assert_eq!(job.final_status(), JobStatus::Completed);
    }

    #[test]
    fn test_cancel_skips_only_pending_commits() {
        let mut job = make_job(3);
        job.status = JobStatus::InProgress;
        job.commits[0].begin();
        job.commits[0].complete(Utc::now());
        job.commits[1].begin();

        job.cancel(Utc::now()).unwrap();

        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.finished_at.is_some());
        assert_eq!(job.commits[0].status, CommitStatus::Completed);
        assert_eq!(job.commits[1].status, CommitStatus::InProgress);
        assert_eq!(job.commits[2].status, CommitStatus::Skipped);
    }

    #[test]
    fn test_cancel_rejects_terminal_jobs() {
        for status in [
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            let mut job = make_job(1);
            job.status = status;
            let err = job.cancel(Utc::now()).unwrap_err();
            assert!(matches!(err, Error::Conflict(_)));
            assert_eq!(job.status, status);
            assert_eq!(job.commits[0].status, CommitStatus::Pending);
        }
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!("in_progress".parse::<JobStatus>().unwrap(), JobStatus::InProgress);
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_delay_scales_with_unit() {
        let commit = CommitRecord::new(vec![], "m", 3);
        assert_eq!(commit.delay(Duration::from_secs(60)), Duration::from_secs(180));
        assert_eq!(commit.delay(Duration::from_millis(10)), Duration::from_millis(30));
    }
}
