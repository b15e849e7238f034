//! Control channel message types.
//!
//! These travel as JSON over the `universal-clipboard` channel of a peer
//! link. Payload fields are sealed [`Envelope`]s; identifiers and counts are
//! in the clear.

use serde::{Deserialize, Serialize};

use cliplink_core::{ClipboardKind, TransferId, UserId};
use cliplink_crypto::Envelope;

use crate::error::{Result, SyncError};

/// Messages on the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// A whole clipboard value.
    Clipboard(ClipboardMessage),

    /// Start or end of a chunked transfer on the file channel.
    FileTransfer(FileTransferMessage),
}

/// A clipboard value sent in one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardMessage {
    pub clipboard_type: ClipboardKind,
    /// Sealed text, or sealed raw bytes for inline files.
    pub content: Envelope,
    /// Sealed file name, inline files only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<Envelope>,
    pub sender_id: UserId,
    pub timestamp: i64,
}

/// Transfer boundary markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum FileTransferMessage {
    #[serde(rename_all = "camelCase")]
    Start {
        transfer_id: TransferId,
        file_name: Envelope,
        sender_id: UserId,
        /// Number of frames that will follow (0 = unknown).
        #[serde(default)]
        total_chunks: u32,
    },

    #[serde(rename_all = "camelCase")]
    End {
        transfer_id: TransferId,
        sender_id: UserId,
    },
}

impl FileTransferMessage {
    pub fn transfer_id(&self) -> TransferId {
        match self {
            Self::Start { transfer_id, .. } | Self::End { transfer_id, .. } => *transfer_id,
        }
    }
}

impl ControlMessage {
    /// Decode one control channel payload.
    pub fn decode(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }

    /// Encode for the control channel.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }
}
