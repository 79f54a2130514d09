//! Collaborators built once from configuration and shared by every command.

use anyhow::{Context, Result};
use commitdrip_config::EngineConfig;
use commitdrip_core::{JobQueue, Notifier, ObjectStore, RemoteHost};
use commitdrip_db::{FsObjectStore, JobRepo, MemoryJobRepo, PgJobRepo};
use commitdrip_executor::GitDriver;
use commitdrip_scheduler::{
    FanoutNotifier, JobRunner, MemoryJobQueue, RedisJobQueue, RunnerConfig, TracingNotifier,
    WebhookNotifier,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::services::GitHubHost;

pub struct Engine {
    pub config: EngineConfig,
    pub jobs: Arc<dyn JobRepo>,
    pub objects: Arc<dyn ObjectStore>,
    pub queue: Arc<dyn JobQueue>,
}

impl Engine {
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        let jobs: Arc<dyn JobRepo> = match &config.database.url {
            Some(url) => {
                let pool = commitdrip_db::create_pool(url)
                    .await
                    .context("Failed to connect to database")?;
                info!("Connected to database");
                Arc::new(PgJobRepo::new(pool))
            }
            None => {
                warn!("No database configured; job state lives in this process only");
                Arc::new(MemoryJobRepo::new())
            }
        };

        let queue: Arc<dyn JobQueue> = match &config.queue.url {
            Some(url) => Arc::new(
                RedisJobQueue::new(url, config.queue.key.clone(), config.worker.pop_timeout)
                    .context("Failed to configure queue")?,
            ),
            None => {
                warn!("No queue configured; using an in-process queue");
                Arc::new(MemoryJobQueue::new())
            }
        };

        let objects: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(&config.storage.root));

        Ok(Self {
            config,
            jobs,
            objects,
            queue,
        })
    }

    /// Log every outcome, and post it to the webhook when one is configured.
    pub fn notifier(&self) -> Arc<dyn Notifier> {
        match &self.config.notify.webhook {
            Some(url) => Arc::new(FanoutNotifier::new(vec![
                Arc::new(TracingNotifier),
                Arc::new(WebhookNotifier::new(url.clone())),
            ])),
            None => Arc::new(TracingNotifier),
        }
    }

    /// The repository host, when credentials to talk to it are configured.
    pub fn remote_host(&self) -> Option<Arc<dyn RemoteHost>> {
        self.config
            .git
            .token
            .as_ref()
            .map(|token| Arc::new(GitHubHost::new(token.clone())) as Arc<dyn RemoteHost>)
    }

    pub fn runner(&self, shutdown: CancellationToken) -> JobRunner {
        let mut driver = GitDriver::new(self.config.git.timeout);
        if let Some(token) = &self.config.git.token {
            driver = driver.with_secret(token.clone());
        }

        JobRunner::new(
            self.jobs.clone(),
            self.objects.clone(),
            self.notifier(),
            driver,
            RunnerConfig::from_engine(&self.config),
        )
        .with_shutdown(shutdown)
    }
}
