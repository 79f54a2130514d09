//! Job-level failures.

use commitdrip_db::DbError;
use commitdrip_executor::{GitFailure, WorkspaceError};
use thiserror::Error;

/// An error that aborts a job. Commit-level failures never surface here.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("job store error: {0}")]
    Store(#[from] DbError),

    #[error("archive fetch failed: {0}")]
    Archive(#[from] commitdrip_core::Error),

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("repository setup failed: {0}")]
    Setup(#[from] GitFailure),

    #[error("job disappeared from the store")]
    Vanished,

    #[error("job processing panicked: {0}")]
    Panicked(String),
}

pub type RunResult<T> = Result<T, RunError>;
