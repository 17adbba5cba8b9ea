//! Remote error types and their POSIX classification.
//!
//! WebHDFS reports failures as a `RemoteException` carrying the Java
//! exception class name. [`RemoteError::from_exception`] folds those names
//! into a small set of variants, and [`ErrorCategory`] provides a unified
//! classification that mount frontends convert to errno values.

use thiserror::Error;

/// Errors returned by a [`RemoteStore`](crate::RemoteStore).
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote object does not exist.
    #[error("remote path not found: {0}")]
    NotFound(String),

    /// The remote object already exists (create collision).
    #[error("remote path already exists: {0}")]
    AlreadyExists(String),

    /// The remote store rejected the call on access-control grounds.
    #[error("remote access denied: {0}")]
    AccessDenied(String),

    /// Remote I/O failure, including reads that ended early.
    #[error("remote I/O failure: {0}")]
    Io(String),

    /// Any remote exception without a dedicated variant.
    #[error("remote {exception}: {message}")]
    Remote {
        /// Exception name as reported by the remote store.
        exception: String,
        /// Human-readable detail.
        message: String,
    },

    /// The configured endpoint is not a usable URL.
    #[error("invalid WebHDFS endpoint: {0}")]
    Endpoint(String),

    /// HTTP transport failure (connect, timeout, body read).
    #[error("HTTP transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote answered with JSON we could not decode.
    #[error("malformed remote response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RemoteError {
    /// Classifies a remote exception by its (short or fully-qualified) Java class name.
    pub fn from_exception(exception: &str, message: String) -> Self {
        let short = exception.rsplit('.').next().unwrap_or(exception);
        match short {
            "FileNotFoundException" => RemoteError::NotFound(message),
            "FileAlreadyExistsException" => RemoteError::AlreadyExists(message),
            "AccessControlException" | "SecurityException" | "AuthorizationException" => {
                RemoteError::AccessDenied(message)
            }
            "EOFException" | "IOException" => RemoteError::Io(message),
            _ => RemoteError::Remote {
                exception: short.to_string(),
                message,
            },
        }
    }

    /// Returns the POSIX-facing category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RemoteError::NotFound(_) => ErrorCategory::NotFound,
            RemoteError::AlreadyExists(_) => ErrorCategory::AlreadyExists,
            RemoteError::AccessDenied(_) => ErrorCategory::AccessDenied,
            RemoteError::Io(_)
            | RemoteError::Endpoint(_)
            | RemoteError::Transport(_)
            | RemoteError::Decode(_) => ErrorCategory::IoFault,
            RemoteError::Remote { .. } => ErrorCategory::Unsupported,
        }
    }
}

/// Result type for remote store calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// POSIX-facing error classification.
///
/// Shared by every layer between the remote store and the kernel bridge so
/// that the errno mapping lives in exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Remote object absent.
    NotFound,
    /// Create collision.
    AlreadyExists,
    /// Remote access-control rejection.
    AccessDenied,
    /// Remote I/O or truncated-read failure.
    IoFault,
    /// Operation on an unknown or stale handle.
    NotOpen,
    /// Remote failure with no known mapping.
    Unsupported,
    /// Operation intentionally not implemented.
    NotImplemented,
}

impl ErrorCategory {
    /// Converts this category to a libc error code.
    pub fn to_errno(self) -> i32 {
        match self {
            ErrorCategory::NotFound => libc::ENOENT,
            ErrorCategory::AlreadyExists => libc::EEXIST,
            ErrorCategory::AccessDenied => libc::EACCES,
            ErrorCategory::IoFault => libc::EIO,
            ErrorCategory::NotOpen => libc::EBADF,
            ErrorCategory::Unsupported => libc::ENOTSUP,
            ErrorCategory::NotImplemented => libc::ENOSYS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_exception_known_names() {
        let e = RemoteError::from_exception("FileNotFoundException", "File does not exist: /x".into());
        assert!(matches!(e, RemoteError::NotFound(_)));
        assert_eq!(e.category(), ErrorCategory::NotFound);

        let e = RemoteError::from_exception("FileAlreadyExistsException", "/x".into());
        assert_eq!(e.category(), ErrorCategory::AlreadyExists);

        let e = RemoteError::from_exception("AccessControlException", "Permission denied".into());
        assert_eq!(e.category(), ErrorCategory::AccessDenied);

        let e = RemoteError::from_exception("EOFException", "Cannot seek after EOF".into());
        assert_eq!(e.category(), ErrorCategory::IoFault);

        let e = RemoteError::from_exception("IOException", "broken pipe".into());
        assert_eq!(e.category(), ErrorCategory::IoFault);
    }

    #[test]
    fn test_from_exception_fully_qualified_name() {
        let e = RemoteError::from_exception(
            "org.apache.hadoop.security.AccessControlException",
            "Permission denied: user=bob".into(),
        );
        assert!(matches!(e, RemoteError::AccessDenied(_)));
    }

    #[test]
    fn test_unmapped_exception_keeps_detail() {
        let e = RemoteError::from_exception(
            "SafeModeException",
            "Name node is in safe mode.".into(),
        );
        assert_eq!(e.category(), ErrorCategory::Unsupported);
        let text = e.to_string();
        assert!(text.contains("SafeModeException"));
        assert!(text.contains("safe mode"));
    }

    #[test]
    fn test_category_errno_mapping() {
        assert_eq!(ErrorCategory::NotFound.to_errno(), libc::ENOENT);
        assert_eq!(ErrorCategory::AlreadyExists.to_errno(), libc::EEXIST);
        assert_eq!(ErrorCategory::AccessDenied.to_errno(), libc::EACCES);
        assert_eq!(ErrorCategory::IoFault.to_errno(), libc::EIO);
        assert_eq!(ErrorCategory::NotOpen.to_errno(), libc::EBADF);
        assert_eq!(ErrorCategory::Unsupported.to_errno(), libc::ENOTSUP);
        assert_eq!(ErrorCategory::NotImplemented.to_errno(), libc::ENOSYS);
    }

    #[test]
    fn test_decode_error_is_io_fault() {
        let e: RemoteError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert_eq!(e.category(), ErrorCategory::IoFault);
    }
}
