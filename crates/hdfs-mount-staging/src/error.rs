use hdfs_mount_core::{ErrorCategory, RemoteFileType};
use std::io;
use thiserror::Error;

/// Errors raised by the staging layer.
#[derive(Debug, Error)]
pub enum StagingError {
    /// The handle id is not open.
    #[error("handle {0} is not open")]
    NotOpen(u64),

    /// The remote entry is neither a directory nor a regular file.
    #[error("unsupported remote entry type: {0}")]
    UnsupportedType(RemoteFileType),

    /// Staging buffer I/O failed (spill file or allocation).
    #[error("staging buffer I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl StagingError {
    /// Returns the POSIX-facing category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            StagingError::NotOpen(_) => ErrorCategory::NotOpen,
            StagingError::UnsupportedType(_) => ErrorCategory::Unsupported,
            StagingError::Io(_) => ErrorCategory::IoFault,
        }
    }
}

/// Result type for staging operations.
pub type StagingResult<T> = Result<T, StagingError>;
