//! Error types for ArborDB.

use thiserror::Error;

/// Result type alias using ArborError.
pub type Result<T> = std::result::Result<T, ArborError>;

/// Errors that can occur in ArborDB operations.
#[derive(Debug, Error)]
pub enum ArborError {
    // Key errors
    #[error("Key not found")]
    KeyNotFound,

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    // Structural errors
    #[error("Tree corrupted: {0}")]
    TreeCorrupted(String),

    // Tree management errors
    #[error("Tree already exists: {0}")]
    TreeExists(String),

    #[error("Tree not found: {0}")]
    TreeNotFound(String),

    #[error("Tree capacity exceeded: at most {max} trees may be retained")]
    CapacityExceeded { max: usize },

    #[error("Invalid order: {order} (minimum {min})")]
    InvalidOrder { order: usize, min: usize },

    #[error("Invalid row count: {got} (allowed {min}..={max})")]
    InvalidCount { min: usize, max: usize, got: usize },

    // Codec errors
    #[error("Codec error: {0}")]
    Codec(String),

    // Persistence errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialize(String),
}

impl ArborError {
    /// Returns true for failures that indicate corrupted internal state
    /// rather than an ordinary miss or rejected request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ArborError::TreeCorrupted(_))
    }
}
