//! Job dispatch and execution for commitdrip.
//!
//! Pulls job identifiers from a durable queue and drives each job through its
//! commit plan. Jobs left IN_PROGRESS by a crash are picked up again at startup.

pub mod error;
pub mod notify;
pub mod queue;
pub mod runner;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{RunError, RunResult};
pub use notify::{FanoutNotifier, TracingNotifier, WebhookNotifier};
pub use queue::{MemoryJobQueue, RedisJobQueue};
pub use runner::{JobRunner, NO_FILES_REASON, RunOutcome, RunnerConfig};
pub use worker::{DispatchConfig, Worker};
