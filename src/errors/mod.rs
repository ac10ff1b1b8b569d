//! Error taxonomy for the document store.
//!
//! Every fallible store operation returns [`StoreError`]. The variant decides
//! the propagation policy: transient I/O is retried inside the store,
//! corruption and host failures are handed to recovery, validation failures
//! go straight back to the caller.

mod reporter;

pub use reporter::{
    ErrorContext, ErrorReport, ErrorReporter, ErrorStats, Severity, DEFAULT_HISTORY_CAP,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DataCorruption,
    PermissionDenied,
    HostApiUnavailable,
    TransientIo,
    ValidationFailure,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DataCorruption => "data_corruption",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::HostApiUnavailable => "host_api_unavailable",
            ErrorKind::TransientIo => "transient_io",
            ErrorKind::ValidationFailure => "validation_failure",
            ErrorKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("host storage unavailable: {0}")]
    HostUnavailable(String),

    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("save failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },

    #[error("recovery failed: {0}")]
    RecoveryFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Corruption(_) => ErrorKind::DataCorruption,
            StoreError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            StoreError::HostUnavailable(_) => ErrorKind::HostApiUnavailable,
            StoreError::TransientIo(_) => ErrorKind::TransientIo,
            StoreError::Validation(_) => ErrorKind::ValidationFailure,
            StoreError::RetriesExhausted { source, .. } => source.kind(),
            StoreError::NotFound(_) | StoreError::RecoveryFailed(_) | StoreError::Other(_) => {
                ErrorKind::Unknown
            }
        }
    }

    /// Only host write/read hiccups are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::TransientIo(_))
    }

    /// Errors that the recovery cascade knows how to resolve.
    pub fn needs_recovery(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::DataCorruption | ErrorKind::HostApiUnavailable
        )
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        match err.kind() {
            Io::PermissionDenied => StoreError::PermissionDenied(err.to_string()),
            Io::InvalidData | Io::UnexpectedEof => StoreError::Corruption(err.to_string()),
            _ => StoreError::TransientIo(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            StoreError::TransientIo(err.to_string())
        } else {
            StoreError::Corruption(err.to_string())
        }
    }
}
