//! KDL configuration parsing for commitdrip.
//!
//! A single `commitdrip.kdl` file describes the store, queue, archive storage,
//! git remote and worker tuning. Environment variables override file values.

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    DatabaseConfig, EngineConfig, GitConfig, NotifyConfig, QueueConfig, StorageConfig,
    WorkerConfig, parse_engine_config,
};
