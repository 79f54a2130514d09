//! In-memory job repository for tests and single-process runs.

use async_trait::async_trait;
use commitdrip_core::{Job, JobId, JobStatus};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::job::{JobRepo, JobUpdate};
use crate::{DbError, DbResult};

#[derive(Default)]
pub struct MemoryJobRepo {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a job, for assertions.
    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl JobRepo for MemoryJobRepo {
    async fn insert(&self, job: &Job) -> DbResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(DbError::Duplicate(format!("job {}", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find(&self, id: JobId) -> DbResult<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn find_by_status(&self, status: JobStatus) -> DbResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut found: Vec<Job> = jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|j| (j.created_at, *j.id.as_uuid()));
        Ok(found)
    }

    async fn list(&self, status: Option<JobStatus>, limit: i64) -> DbResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut found: Vec<Job> = jobs
            .values()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        found.sort_by_key(|j| std::cmp::Reverse((j.created_at, *j.id.as_uuid())));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> DbResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        update.apply(job);
        Ok(())
    }
}
