// ============================================================================
// File: src/backends/errors.rs
// ----------------------------------------------------------------------------
// Backend-specific error types
// ============================================================================

use std::fmt;

/// Errors raised inside backend channel plumbing.
///
/// The `ControlBackend` trait itself reports plain booleans, mirroring the
/// daemon's accept/reject answers. These errors live underneath: the wire
/// and request layers return them, and each backend flattens them to a
/// logged `false` at its trait boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The daemon answered and said no
    #[error("daemon rejected {op}: {reason}")]
    Rejected { op: &'static str, reason: String },

    /// The request never completed cleanly
    #[error("transport failure during {op}: {details}")]
    Transport { op: &'static str, details: String },

    /// The daemon answered something we cannot interpret
    #[error("malformed daemon response: {details}")]
    MalformedResponse { details: String },

    /// Local I/O failure (socket setup, filesystem)
    #[error("i/o failure: {details}")]
    Io { details: String },
}

impl BackendError {
    pub fn rejected(op: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Rejected {
            op,
            reason: reason.into(),
        }
    }

    pub fn transport(op: &'static str, err: impl fmt::Display) -> Self {
        BackendError::Transport {
            op,
            details: format!("{err:#}"),
        }
    }

    pub fn malformed(details: impl Into<String>) -> Self {
        BackendError::MalformedResponse {
            details: details.into(),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io {
            details: err.to_string(),
        }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
