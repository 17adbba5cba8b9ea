//! Error handling and mapping for the FUSE filesystem.
//!
//! Every failure the dispatcher can produce is an [`FsError`]. Its
//! [`ErrorCategory`] is shared with the remote and staging layers, so the
//! errno translation happens in one place and only at the reply boundary.

use hdfs_mount_core::{ErrorCategory, RemoteError};
use hdfs_mount_staging::StagingError;
use std::io;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// Remote store call failed.
    #[error("{0}")]
    Remote(#[from] RemoteError),

    /// Handle table, attribute translation or staging buffer failure.
    #[error("{0}")]
    Staging(#[from] StagingError),

    /// Operation intentionally not implemented.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// Inode unknown to the inode table.
    #[error("Invalid inode: {0}")]
    InvalidInode(u64),

    /// A gap fetch returned fewer bytes than the remote object should hold.
    #[error("short read from {path}: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Remote path.
        path: String,
        /// Bytes requested.
        expected: u64,
        /// Bytes returned.
        actual: u64,
    },
}

impl FsError {
    /// Returns the POSIX-facing category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            FsError::Remote(e) => e.category(),
            FsError::Staging(e) => e.category(),
            FsError::NotImplemented(_) => ErrorCategory::NotImplemented,
            FsError::InvalidInode(_) => ErrorCategory::NotFound,
            FsError::ShortRead { .. } => ErrorCategory::IoFault,
        }
    }

    /// Converts this error to a libc error code for FUSE.
    pub fn to_errno(&self) -> i32 {
        self.category().to_errno()
    }

    /// Logs the failure of `op` and returns the errno to reply with.
    ///
    /// Failures without a known mapping are logged at warn with their
    /// original detail; the rest are routine and logged at debug.
    pub fn reply_errno(&self, op: &str) -> i32 {
        match self.category() {
            ErrorCategory::Unsupported => warn!(op, error = %self, "Unmapped failure"),
            _ => debug!(op, error = %self, "Operation failed"),
        }
        self.to_errno()
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        FsError::Staging(StagingError::Io(e))
    }
}

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;
