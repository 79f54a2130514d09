//! Git execution backend for commitdrip.
//!
//! Provides everything that touches a job's working tree:
//! - A subprocess driver for git with a bounded timeout
//! - Archive extraction into a job-scoped workspace
//! - Repository setup, staging and committing
//! - The push cascade that lands a commit on a diverged remote

pub mod archive;
pub mod cascade;
pub mod driver;
pub mod error;
pub mod repo;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use cascade::{PushMode, PushReport, Reconcile, push_with_cascade};
pub use driver::{DEFAULT_TIMEOUT, FailureReason, GitDriver, GitFailure, GitOutput, GitResult};
pub use error::WorkspaceError;
pub use repo::{LocalRepo, RemoteSpec, StageOutcome};
pub use workspace::Workspace;
