//! Object store abstraction for uploaded source archives.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::{JobId, Result};

/// Key under which a job's archive is stored.
///
/// The extension follows the archive format so the key stays self-describing.
pub fn archive_key(job_id: &JobId, file_name: &str) -> String {
    let extension = if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
        "tar.gz"
    } else {
        "zip"
    };
    format!("jobs/{}/source.{}", job_id, extension)
}

/// Trait for archive storage backends.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, returning the key.
    async fn put(&self, key: &str, data: Bytes) -> Result<String>;

    /// Download the object to `dest`, returning the local path.
    async fn fetch(&self, key: &str, dest: &Path) -> Result<PathBuf>;

    /// Delete the object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
