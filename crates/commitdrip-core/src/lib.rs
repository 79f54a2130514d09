//! Core domain types and traits for commitdrip.
//!
//! This crate contains:
//! - Job and commit records with their status lifecycles
//! - Commit plans accepted from users
//! - Collaborator traits: object store, job queue, notifier, remote host

pub mod error;
pub mod host;
pub mod id;
pub mod job;
pub mod notify;
pub mod plan;
pub mod queue;
pub mod storage;

pub use error::{Error, Result};
pub use host::RemoteHost;
pub use id::JobId;
pub use job::{CANCELLED_REASON, CommitRecord, CommitStatus, Job, JobStatus};
pub use notify::{Notification, NotificationKind, Notifier};
pub use plan::{CommitPlan, JobPlan};
pub use queue::JobQueue;
pub use storage::{ObjectStore, archive_key};
