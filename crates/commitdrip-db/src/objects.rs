//! Filesystem-backed archive store.

use async_trait::async_trait;
use bytes::Bytes;
use commitdrip_core::{Error, ObjectStore, Result};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Stores objects as plain files below a root directory.
///
/// Keys map directly onto relative paths, so `jobs/{id}/source.zip`
/// lands at `{root}/jobs/{id}/source.zip`.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(Error::InvalidInput(format!("invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }
}

fn storage_error(action: &str, key: &str, e: std::io::Error) -> Error {
    Error::Storage(format!("failed to {} {}: {}", action, key, e))
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("prepare", key, e))?;
        }
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| storage_error("write", key, e))?;
        debug!(key, bytes = data.len(), "Stored object");
        Ok(key.to_string())
    }

    async fn fetch(&self, key: &str, dest: &Path) -> Result<PathBuf> {
        let path = self.path_for(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("prepare", key, e))?;
        }
        tokio::fs::copy(&path, dest)
            .await
            .map_err(|e| storage_error("fetch", key, e))?;
        Ok(dest.to_path_buf())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(storage_error("delete", key, e)),
        }

        // Prune the now-empty per-job directory; failure here is harmless.
        if let Some(parent) = path.parent() {
            if parent != self.root {
                let _ = tokio::fs::remove_dir(parent).await;
            }
        }
        Ok(())
    }
}
