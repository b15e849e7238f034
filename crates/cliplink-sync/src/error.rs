//! Error types for the sync module.

use thiserror::Error;

use cliplink_core::TransferId;

/// Errors that can occur on peer links and transfers.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Message could not be decoded or violates the protocol.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Frame shorter than the fixed header.
    #[error("frame too short: {0} bytes")]
    ShortFrame(usize),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Send on a channel that is not open.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// A negotiation step arrived in the wrong role or state.
    #[error("invalid link state: {0}")]
    InvalidState(String),

    /// Sealing, opening or (de)compression failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] cliplink_crypto::CryptoError),

    /// Payload does not fit the frame's 32-bit chunk counter.
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(u64),

    /// A transfer was aborted.
    #[error("transfer {id} aborted: {reason}")]
    TransferAborted { id: TransferId, reason: String },

    /// Sink I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Signaling message was malformed.
    #[error("relay error: {0}")]
    Relay(#[from] cliplink_relay::RelayError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
