//! Durable job queue abstraction.

use async_trait::async_trait;
use std::time::Duration;

use crate::{JobId, Result};

/// Queue of job identifiers awaiting execution.
///
/// Delivery is at-least-once; consumers must tolerate redelivery.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job identifier to the tail of the queue.
    async fn push(&self, id: JobId) -> Result<()>;

    /// Wait up to `timeout` for the next identifier.
    ///
    /// Returns `Ok(None)` when the wait times out. An unreachable backend is
    /// reported as [`crate::Error::Queue`].
    async fn blocking_pop(&self, timeout: Duration) -> Result<Option<JobId>>;
}
