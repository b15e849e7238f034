//! Error types for Cliplink Core.

use thiserror::Error;

/// Errors raised while constructing or parsing core values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("identifier must not be empty: {0}")]
    EmptyIdentifier(&'static str),

    #[error("invalid transfer id: {0}")]
    InvalidTransferId(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
