//! Job repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use commitdrip_core::{CommitRecord, Job, JobId, JobStatus};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{DbError, DbResult};

/// A job row in the database. Commits are stored as a JSONB array.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub id: uuid::Uuid,
    pub repo: String,
    pub archive_key: String,
    pub commits: serde_json::Value,
    pub status: String,
    pub total_commits: i32,
    pub completed_commits: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TryFrom<JobRecord> for Job {
    type Error = DbError;

    fn try_from(record: JobRecord) -> DbResult<Self> {
        let status: JobStatus = record
            .status
            .parse()
            .map_err(|e: commitdrip_core::Error| DbError::Corrupt(e.to_string()))?;
        let commits: Vec<CommitRecord> = serde_json::from_value(record.commits)?;

        Ok(Job {
            id: JobId::from_uuid(record.id),
            repo: record.repo,
            archive_key: record.archive_key,
            commits,
            status,
            total_commits: record.total_commits as u32,
            completed_commits: record.completed_commits as u32,
            created_at: record.created_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
            error: record.error,
        })
    }
}

/// Partial update of a job. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub commits: Option<Vec<CommitRecord>>,
    pub completed_commits: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Persist the commit list together with its derived completed counter.
    pub fn progress(mut self, job: &Job) -> Self {
        self.commits = Some(job.commits.clone());
        self.completed_commits = Some(
            job.commits
                .iter()
                .filter(|c| c.status == commitdrip_core::CommitStatus::Completed)
                .count() as u32,
        );
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(at);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Apply the update to an in-memory job.
    pub fn apply(&self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(commits) = &self.commits {
            job.commits = commits.clone();
        }
        if let Some(completed) = self.completed_commits {
            job.completed_commits = completed;
        }
        if let Some(at) = self.started_at {
            job.started_at = Some(at);
        }
        if let Some(at) = self.finished_at {
            job.finished_at = Some(at);
        }
        if let Some(error) = &self.error {
            job.error = Some(error.clone());
        }
    }
}

#[async_trait]
pub trait JobRepo: Send + Sync {
    async fn insert(&self, job: &Job) -> DbResult<()>;
    async fn find(&self, id: JobId) -> DbResult<Option<Job>>;
    async fn find_by_status(&self, status: JobStatus) -> DbResult<Vec<Job>>;
    /// Newest first.
    async fn list(&self, status: Option<JobStatus>, limit: i64) -> DbResult<Vec<Job>>;
    async fn update(&self, id: JobId, update: JobUpdate) -> DbResult<()>;

    /// Cancel a job on behalf of a user request.
    ///
    /// Terminal jobs are rejected with [`DbError::Conflict`].
    async fn cancel(&self, id: JobId) -> DbResult<Job> {
        let mut job = self
            .find(id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;

        job.cancel(Utc::now())
            .map_err(|e| DbError::Conflict(e.to_string()))?;

        let mut update = JobUpdate::new().status(JobStatus::Cancelled).progress(&job);
        if let Some(at) = job.finished_at {
            update = update.finished_at(at);
        }
        self.update(id, update).await?;
        Ok(job)
    }
}

/// PostgreSQL implementation of JobRepo.
pub struct PgJobRepo {
    pool: PgPool,
}

impl PgJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepo for PgJobRepo {
    async fn insert(&self, job: &Job) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, repo, archive_key, commits, status, total_commits,
                              completed_commits, created_at, started_at, finished_at, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(&job.repo)
        .bind(&job.archive_key)
        .bind(serde_json::to_value(&job.commits)?)
        .bind(job.status.as_str())
        .bind(job.total_commits as i32)
        .bind(job.completed_commits as i32)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(&job.error)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DbError::Duplicate(format!("job {}", job.id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, id: JobId) -> DbResult<Option<Job>> {
        let record = sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        record.map(Job::try_from).transpose()
    }

    async fn find_by_status(&self, status: JobStatus) -> DbResult<Vec<Job>> {
        let records = sqlx::query_as::<_, JobRecord>(
            "SELECT * FROM jobs WHERE status = $1 ORDER BY created_at ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(Job::try_from).collect()
    }

    async fn list(&self, status: Option<JobStatus>, limit: i64) -> DbResult<Vec<Job>> {
        let records = sqlx::query_as::<_, JobRecord>(
            r#"
            SELECT * FROM jobs
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(Job::try_from).collect()
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> DbResult<()> {
        let commits = update
            .commits
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                status = COALESCE($2, status),
                commits = COALESCE($3, commits),
                completed_commits = COALESCE($4, completed_commits),
                started_at = COALESCE($5, started_at),
                finished_at = COALESCE($6, finished_at),
                error = COALESCE($7, error)
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(update.status.map(|s| s.as_str()))
        .bind(commits)
        .bind(update.completed_commits.map(|c| c as i32))
        .bind(update.started_at)
        .bind(update.finished_at)
        .bind(update.error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("job {}", id)));
        }
        Ok(())
    }
}
