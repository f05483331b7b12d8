//! Error types for Stubo

use std::io;
use thiserror::Error;

/// Result type for Stubo operations
pub type Result<T> = std::result::Result<T, StuboError>;

/// Errors that can occur while recording or playing back traffic
#[derive(Debug, Error)]
pub enum StuboError {
    /// The stub server explicitly signalled a failure
    #[error("stubo error {code}: {message}")]
    Remote {
        /// Error code reported by the server
        code: i64,
        /// Error message reported by the server
        message: String,
    },

    /// Local misuse detected by the interceptor or session
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection or I/O failure from the underlying HTTP client
    #[error("Transport error: {0}")]
    Transport(String),

    /// URL could not be built or parsed
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Payload could not be encoded or decoded as JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// One or more recorded stubs could not be pushed on stop
    #[error("{failed} of {total} stubs failed to push, first failure: {first}")]
    StubPush {
        /// Number of failed pushes
        failed: usize,
        /// Number of recorded exchanges
        total: usize,
        /// The first failure encountered
        first: Box<StuboError>,
    },
}

impl StuboError {
    /// Build a `Remote` error from a code and message
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }

    /// Server error code, if this error came from the stub server
    #[must_use]
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}
