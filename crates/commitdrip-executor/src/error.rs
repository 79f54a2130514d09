//! Workspace error types.

use thiserror::Error;

use crate::driver::GitFailure;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("unrecognized archive format (expected zip or tar.gz)")]
    UnknownFormat,

    #[error("archive entry escapes the extraction root: {0}")]
    UnsafePath(String),

    #[error(transparent)]
    Git(#[from] GitFailure),
}

impl From<zip::result::ZipError> for WorkspaceError {
    fn from(err: zip::result::ZipError) -> Self {
        WorkspaceError::Archive(err.to_string())
    }
}
