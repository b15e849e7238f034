//! Error types for the Cliplink client.

use cliplink_core::CoreError;
use cliplink_crypto::CryptoError;
use cliplink_relay::RelayError;
use cliplink_sync::SyncError;
use thiserror::Error;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid identifier.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Key derivation, sealing or opening failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Rendezvous message could not be built.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Peer link or transfer error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The clipboard collaborator failed.
    #[error("clipboard error: {0}")]
    Clipboard(String),

    /// The key derivation worker did not finish.
    #[error("key derivation task failed: {0}")]
    KeyTask(String),

    /// Local file access failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
