//! Error types for the core library.

use thiserror::Error;

use crate::auth::AuthError;

/// Core library error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A configuration-related error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A path resolution or validation error.
    #[error("path error: {0}")]
    Path(String),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Token acquisition failed; the request was never sent.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// A network failure or a non-success HTTP status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The requested directory object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A generic error for other cases.
    #[error("error: {0}")]
    Other(String),
}

impl CoreError {
    /// Whether this error came from the shared token-acquisition path.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;
