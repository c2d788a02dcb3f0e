//! Error types for the transfer engine with context and recovery information

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while probing, fetching, merging or verifying a transfer
#[derive(Error, Debug)]
pub enum TransferError {
    /// Credentials were rejected; retrying cannot help
    #[error("authentication rejected for '{url}' (status {status})")]
    Authentication { url: String, status: u16 },

    /// The shared HTTP client could not be constructed
    #[error("failed to create HTTP client")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },

    /// Connection-level failure (DNS, reset, TLS, ...)
    #[error("request to '{url}' failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Any non-success status other than a 401
    #[error("unexpected status {status} from '{url}'")]
    Status { url: String, status: u16 },

    /// No bytes arrived within the per-read timeout; the attempt is abandoned
    #[error("no data from '{url}' within {limit:?}")]
    Timeout { url: String, limit: Duration },

    /// A ranged response ended before delivering its full range
    #[error("chunk {index} body ended early: expected {expected} bytes, got {actual}")]
    ShortBody { index: u32, expected: u64, actual: u64 },

    /// The server answered a ranged request without confirming the offset
    #[error("server ignored range request for chunk {index} of '{url}'")]
    RangeIgnored { url: String, index: u32 },

    /// Retry budget exhausted; wraps the last failure seen
    #[error("{label} failed after {max_attempts} attempts: {last_error}")]
    RetriesExhausted {
        label: String,
        max_attempts: u32,
        last_error: String,
    },

    /// A chunk gave up after exhausting its retries; aborts the whole job
    #[error("chunk {index} aborted after {attempts} attempts: {last_error}")]
    ChunkFetch {
        index: u32,
        attempts: u32,
        last_error: String,
    },

    /// Concatenating part files into the destination failed
    #[error("merge failed at '{path}'")]
    Merge {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The downloaded artifact does not match the expected checksum
    #[error("checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// File system I/O failure with file context
    #[error("file operation failed on '{path}' while {operation}")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid URL '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Types of file operations for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    Create,
    Remove,
    Rename,
    Metadata,
    CreateDir,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Create => write!(f, "creating"),
            FileOperation::Remove => write!(f, "removing"),
            FileOperation::Rename => write!(f, "renaming"),
            FileOperation::Metadata => write!(f, "reading metadata"),
            FileOperation::CreateDir => write!(f, "creating directory"),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;

impl TransferError {
    /// Check if the error is transient (the retry governor should try again)
    pub fn is_recoverable(&self) -> bool {
        match self {
            TransferError::Network { .. } => true,
            TransferError::Status { .. } => true,
            TransferError::Timeout { .. } => true,
            TransferError::ShortBody { .. } => true,
            TransferError::RangeIgnored { .. } => true,
            TransferError::FileSystem { source, .. } => {
                // Retry on temporary file system issues
                matches!(
                    source.kind(),
                    std::io::ErrorKind::Interrupted
                        | std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                )
            }
            TransferError::Authentication { .. } => false,
            TransferError::ClientBuild { .. } => false,
            TransferError::RetriesExhausted { .. } => false,
            TransferError::ChunkFetch { .. } => false,
            TransferError::Merge { .. } => false,
            TransferError::ChecksumMismatch { .. } => false,
            TransferError::InvalidUrl { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TransferError::Authentication { .. } => "authentication",
            TransferError::ClientBuild { .. } => "client_build",
            TransferError::Network { .. } => "network",
            TransferError::Status { .. } => "status",
            TransferError::Timeout { .. } => "timeout",
            TransferError::ShortBody { .. } => "short_body",
            TransferError::RangeIgnored { .. } => "range_ignored",
            TransferError::RetriesExhausted { .. } => "retries_exhausted",
            TransferError::ChunkFetch { .. } => "chunk_fetch",
            TransferError::Merge { .. } => "merge",
            TransferError::ChecksumMismatch { .. } => "checksum_mismatch",
            TransferError::FileSystem { .. } => "file_system",
            TransferError::InvalidUrl { .. } => "invalid_url",
        }
    }

    pub(crate) fn fs(
        path: impl Into<PathBuf>,
        operation: FileOperation,
        source: std::io::Error,
    ) -> Self {
        TransferError::FileSystem {
            path: path.into(),
            operation,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_is_not_recoverable() {
        let err = TransferError::Authentication {
            url: "http://example.com".to_string(),
            status: 401,
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), "authentication");
    }

    #[test]
    fn non_success_status_is_recoverable() {
        let err = TransferError::Status {
            url: "http://example.com".to_string(),
            status: 503,
        };
        assert!(err.is_recoverable());
    }

    #[test]
    fn timeout_is_recoverable_but_distinct() {
        let err = TransferError::Timeout {
            url: "http://example.com".to_string(),
            limit: Duration::from_secs(10),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "timeout");
    }

    #[test]
    fn checksum_mismatch_is_terminal() {
        let err = TransferError::ChecksumMismatch {
            path: PathBuf::from("/tmp/file.bin"),
            expected: "CBF43926".to_string(),
            actual: "00000000".to_string(),
        };
        assert!(!err.is_recoverable());
        let message = format!("{err}");
        assert!(message.contains("CBF43926"));
        assert!(message.contains("00000000"));
    }

    #[test]
    fn file_system_recoverability_follows_io_kind() {
        let transient = TransferError::fs(
            "/tmp/x",
            FileOperation::Write,
            std::io::Error::new(std::io::ErrorKind::Interrupted, "interrupted"),
        );
        assert!(transient.is_recoverable());

        let hard = TransferError::fs(
            "/tmp/x",
            FileOperation::Write,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!hard.is_recoverable());
    }
}
