//! Per-job scratch directory.

use commitdrip_core::JobId;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::archive;
use crate::error::WorkspaceError;

const ARCHIVE_NAME: &str = "source.archive";
const SOURCE_DIR: &str = "source";

/// A job's working directory: `{work_root}/{job_id}`.
///
/// Holds the downloaded archive and its extracted tree. Nothing in it survives
/// the job; a resumed job starts from a fresh workspace.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    tree: Option<PathBuf>,
}

impl Workspace {
    /// Create an empty workspace, discarding leftovers from an earlier attempt.
    pub async fn prepare(work_root: &Path, job_id: &JobId) -> Result<Self, WorkspaceError> {
        let root = work_root.join(job_id.to_string());
        if tokio::fs::try_exists(&root).await? {
            debug!(path = %root.display(), "Clearing stale workspace");
            tokio::fs::remove_dir_all(&root).await?;
        }
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root, tree: None })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the archive should be downloaded to.
    pub fn archive_path(&self) -> PathBuf {
        self.root.join(ARCHIVE_NAME)
    }

    /// Extract the downloaded archive and return the working tree.
    ///
    /// A `.git` shipped at the top of the tree is discarded so the job starts
    /// from a repository of its own.
    pub async fn unpack(&mut self) -> Result<PathBuf, WorkspaceError> {
        let tree = archive::extract(&self.archive_path(), &self.root.join(SOURCE_DIR)).await?;
        discard_embedded_repo(&tree).await?;
        self.tree = Some(tree.clone());
        Ok(tree)
    }

    /// The extracted working tree, once unpacked.
    pub fn tree(&self) -> Option<&Path> {
        self.tree.as_deref()
    }

    /// Delete the workspace. Failures are logged, never returned.
    pub async fn remove(self) {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => debug!(path = %self.root.display(), "Removed workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.root.display(), error = %e, "Failed to remove workspace"),
        }
    }
}

async fn discard_embedded_repo(tree: &Path) -> Result<(), WorkspaceError> {
    let git_dir = tree.join(".git");
    let metadata = match tokio::fs::symlink_metadata(&git_dir).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    warn!(path = %git_dir.display(), "Archive contains a git repository, discarding it");
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(&git_dir).await?;
    } else {
        tokio::fs::remove_file(&git_dir).await?;
    }
    Ok(())
}
