//! Rendezvous wire messages.
//!
//! Every WebSocket text frame carries exactly one JSON object tagged by
//! `type`. Frames are decoded once into [`RendezvousMessage`] at the
//! boundary and matched exhaustively afterwards.

use serde::{Deserialize, Serialize};

use cliplink_core::{RoomId, UserId};

use crate::error::{RelayError, Result};

/// Messages exchanged between peers and the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RendezvousMessage {
    /// Peer → relay: bind this session to a room.
    Join(Join),

    /// Relay → joiner: every other member of the room.
    ExistingPeers(ExistingPeers),

    /// Relay → members: someone joined.
    PeerJoined(PeerInfo),

    /// Relay → members: someone's session closed.
    PeerLeft(PeerLeft),

    /// Peer ↔ peer via relay: connection negotiation.
    Signal(SignalMessage),

    /// Peer → peers via relay: legacy clipboard broadcast.
    Clipboard(LegacyClipboard),
}

impl RendezvousMessage {
    /// Decode one text frame.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| RelayError::Malformed(e.to_string()))
    }

    /// Encode as one text frame.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| RelayError::Malformed(e.to_string()))
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::ExistingPeers(_) => "existing-peers",
            Self::PeerJoined(_) => "peer-joined",
            Self::PeerLeft(_) => "peer-left",
            Self::Signal(_) => "signal",
            Self::Clipboard(_) => "clipboard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Join {
    pub room_id: RoomId,
    pub user_id: UserId,
    #[serde(default)]
    pub os: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingPeers {
    pub peers: Vec<PeerInfo>,
}

/// A room member as advertised to other members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub user_id: UserId,
    #[serde(default)]
    pub os: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerLeft {
    pub user_id: UserId,
}

/// Kind of negotiation payload carried by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Offer,
    Answer,
    Candidate,
}

/// Whether a session description is an offer or an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// An opaque session description produced by the peer transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A connectivity candidate produced by the peer transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

/// A negotiation message as it travels through the relay.
///
/// `target` is set by the sender (absent means broadcast); `sender_id` is
/// always overwritten by the relay with the sending session's user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    pub signal_type: SignalType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<IceCandidate>,
}

/// The typed content of a [`SignalMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
}

impl SignalMessage {
    /// Build a signal addressed to one peer.
    pub fn to(target: UserId, payload: SignalPayload) -> Self {
        let (signal_type, sdp, candidate) = match payload {
            SignalPayload::Offer(sdp) => (SignalType::Offer, Some(sdp), None),
            SignalPayload::Answer(sdp) => (SignalType::Answer, Some(sdp), None),
            SignalPayload::Candidate(c) => (SignalType::Candidate, None, Some(c)),
        };
        Self {
            target: Some(target),
            sender_id: None,
            signal_type,
            sdp,
            candidate,
        }
    }

    /// Check that the fields match `signal_type` and extract them.
    pub fn payload(&self) -> Result<SignalPayload> {
        match (self.signal_type, &self.sdp, &self.candidate) {
            (SignalType::Offer, Some(sdp), _) if sdp.kind == SdpKind::Offer => {
                Ok(SignalPayload::Offer(sdp.clone()))
            }
            (SignalType::Answer, Some(sdp), _) if sdp.kind == SdpKind::Answer => {
                Ok(SignalPayload::Answer(sdp.clone()))
            }
            (SignalType::Candidate, _, Some(candidate)) => {
                Ok(SignalPayload::Candidate(candidate.clone()))
            }
            (signal_type, _, _) => Err(RelayError::Malformed(format!(
                "{:?} signal without a matching payload",
                signal_type
            ))),
        }
    }
}

/// Legacy relay-broadcast clipboard message.
///
/// Forwarded verbatim (apart from `senderId`) and never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyClipboard {
    pub clipboard_type: String,
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    #[serde(default)]
    pub timestamp: i64,
}
