//! Error types for the relay.

use thiserror::Error;

/// Errors that can occur in the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A frame could not be decoded or encoded.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A non-join message arrived on a session that has not joined a room.
    #[error("session {0} has not joined a room")]
    NotJoined(u64),

    /// Socket-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
