//! Error types for the crypto module.

use thiserror::Error;

/// Errors that can occur while deriving keys, sealing or opening payloads.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (bad parameters or salt).
    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    /// Encryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authentication failed: wrong key or tampered data.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// Envelope could not be parsed or has wrong field sizes.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Compression failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Decompression failed or exceeded the size bound.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Opened plaintext was expected to be UTF-8 and was not.
    #[error("plaintext is not valid UTF-8")]
    InvalidUtf8,
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
