//! # DomainError
//!
//! Centralized error handling for the imageboard core.
//! Maps store and filesystem failures to the kinds callers act on.

use thiserror::Error;

/// The primary error type for all domain and port operations.
#[derive(Error, Debug)]
pub enum DomainError {
    /// No row matches a (board, id) or (key) lookup
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Malformed input, rejected before any transaction opens
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Constraint violation or concurrent mutation inside a transaction
    #[error("conflict: {0}")]
    Conflict(String),

    /// Filesystem read/write failure in the content store
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Image decode/resize/encode failure while deriving a thumbnail
    #[error("thumbnail error: {0}")]
    Thumbnail(String),

    /// Infrastructure failure (e.g. database unreachable)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(resource: &str, id: impl ToString) -> Self {
        Self::NotFound(resource.to_string(), id.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(..))
    }

    /// HTTP-equivalent status for the web layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(..) => 404,
            Self::ValidationError(_) => 400,
            Self::Conflict(_) => 409,
            Self::Storage(_) | Self::Thumbnail(_) | Self::Internal(_) => 500,
        }
    }
}

/// A specialized Result type for imageboard logic.
pub type Result<T> = std::result::Result<T, DomainError>;
