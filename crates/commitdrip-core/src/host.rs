//! Remote repository host abstraction.

use async_trait::async_trait;

use crate::Result;

/// Hosting service that owns the target repositories.
///
/// Used when a plan is accepted; the execution engine never calls it.
#[async_trait]
pub trait RemoteHost: Send + Sync {
    /// Whether `owner/name` exists and is reachable with our credentials.
    async fn exists(&self, repo: &str) -> Result<bool>;

    /// Create `owner/name`. Returns `Ok(false)` if the host declined.
    async fn create(&self, repo: &str) -> Result<bool>;
}
