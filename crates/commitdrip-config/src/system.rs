//! Engine configuration parsing.
//!
//! ```kdl
//! database url="postgres://commitdrip@localhost/commitdrip"
//! queue url="redis://127.0.0.1:6379" key="commitdrip:jobs"
//! storage root="/var/lib/commitdrip/objects"
//! git base-url="https://github.com" username="octo" token="ghp_..." branch="main" timeout-secs=120
//! worker work-dir="/tmp/commitdrip_jobs" pop-timeout-secs=5 backoff-secs=5 \
//!     unavailable-backoff-secs=10 cancel-poll-secs=30 delay-unit-secs=60
//! notify webhook="https://hooks.example.com/commitdrip"
//! ```

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_QUEUE_KEY: &str = "commitdrip:jobs";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_GIT_BASE_URL: &str = "https://github.com";

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
    pub git: GitConfig,
    pub worker: WorkerConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL. Without one the engine falls back to an in-memory store.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Redis URL. Without one the engine uses an in-process queue.
    pub url: Option<String>,
    pub key: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: DEFAULT_QUEUE_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the filesystem object store.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("commitdrip_objects"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Base URL remotes are resolved against, as `{base_url}/{owner}/{name}.git`.
    pub base_url: String,
    pub username: String,
    pub token: Option<String>,
    pub branch: String,
    /// Upper bound on any single git invocation.
    pub timeout: Duration,
    /// Commit author email; defaults to the noreply address of `username`.
    pub author_email: Option<String>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GIT_BASE_URL.to_string(),
            username: "commitdrip".to_string(),
            token: None,
            branch: DEFAULT_BRANCH.to_string(),
            timeout: Duration::from_secs(120),
            author_email: None,
        }
    }
}

impl GitConfig {
    pub fn author_email(&self) -> String {
        self.author_email
            .clone()
            .unwrap_or_else(|| format!("{}@users.noreply.github.com", self.username))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Parent directory of per-job working directories.
    pub work_dir: PathBuf,
    /// Bounded wait of each queue pop.
    pub pop_timeout: Duration,
    /// Pause after a failed queue operation.
    pub backoff: Duration,
    /// Pause while no queue connection can be established at all.
    pub unavailable_backoff: Duration,
    /// How often cancellation is polled while a commit delay elapses.
    pub cancel_poll: Duration,
    /// Wall-clock length of one plan minute.
    pub delay_unit: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("commitdrip_jobs"),
            pop_timeout: Duration::from_secs(5),
            backoff: Duration::from_secs(5),
            unavailable_backoff: Duration::from_secs(10),
            cancel_poll: Duration::from_secs(30),
            delay_unit: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook: Option<String>,
}

impl EngineConfig {
    /// Load from an optional KDL file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                parse_engine_config(&text)?
            }
            None => EngineConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override file values with whatever `lookup` resolves.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.queue.url = Some(url);
        }
        if let Some(root) = lookup("COMMITDRIP_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(username) = lookup("GITHUB_USERNAME") {
            self.git.username = username;
        }
        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.git.token = Some(token);
        }
        if let Some(dir) = lookup("COMMITDRIP_WORK_DIR") {
            self.worker.work_dir = PathBuf::from(dir);
        }
        if let Some(webhook) = lookup("COMMITDRIP_WEBHOOK_URL") {
            self.notify.webhook = Some(webhook);
        }
    }
}

/// Parse engine configuration from KDL text.
pub fn parse_engine_config(kdl: &str) -> ConfigResult<EngineConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = EngineConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "database" => {
                config.database.url = get_string_prop(node, "url");
            }
            "queue" => {
                config.queue.url = get_string_prop(node, "url");
                if let Some(key) = get_string_prop(node, "key") {
                    config.queue.key = key;
                }
            }
            "storage" => {
                let root = get_string_prop(node, "root")
                    .ok_or_else(|| ConfigError::MissingField("storage root".to_string()))?;
                config.storage.root = PathBuf::from(root);
            }
            "git" => parse_git(node, &mut config.git)?,
            "worker" => parse_worker(node, &mut config.worker)?,
            "notify" => {
                config.notify.webhook = get_string_prop(node, "webhook");
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_git(node: &KdlNode, git: &mut GitConfig) -> ConfigResult<()> {
    if let Some(base_url) = get_string_prop(node, "base-url") {
        git.base_url = base_url.trim_end_matches('/').to_string();
    }
    if let Some(username) = get_string_prop(node, "username") {
        git.username = username;
    }
    if let Some(token) = get_string_prop(node, "token") {
        git.token = Some(token);
    }
    if let Some(branch) = get_string_prop(node, "branch") {
        if branch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git branch".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        git.branch = branch;
    }
    if let Some(timeout) = get_secs_prop(node, "timeout-secs")? {
        git.timeout = timeout;
    }
    git.author_email = get_string_prop(node, "author-email").or(git.author_email.take());
    Ok(())
}

fn parse_worker(node: &KdlNode, worker: &mut WorkerConfig) -> ConfigResult<()> {
    if let Some(dir) = get_string_prop(node, "work-dir") {
        worker.work_dir = PathBuf::from(dir);
    }
    if let Some(timeout) = get_secs_prop(node, "pop-timeout-secs")? {
        worker.pop_timeout = timeout;
    }
    if let Some(backoff) = get_secs_prop(node, "backoff-secs")? {
        worker.backoff = backoff;
    }
    if let Some(backoff) = get_secs_prop(node, "unavailable-backoff-secs")? {
        worker.unavailable_backoff = backoff;
    }
    if let Some(poll) = get_secs_prop(node, "cancel-poll-secs")? {
        worker.cancel_poll = poll;
    }
    if let Some(unit) = get_secs_prop(node, "delay-unit-secs")? {
        worker.delay_unit = unit;
    }
    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

/// A strictly positive whole number of seconds.
fn get_secs_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<Duration>> {
    let Some(value) = node.get(name) else {
        return Ok(None);
    };

    match value.as_integer() {
        Some(secs) if secs > 0 && secs <= u64::MAX as i128 => {
            Ok(Some(Duration::from_secs(secs as u64)))
        }
        _ => Err(ConfigError::InvalidValue {
            field: format!("{} {}", node.name().value(), name),
            message: format!("expected a positive integer, got {}", value),
        }),
    }
}
