//! Strong type definitions for Cliplink.
//!
//! All identifiers are newtypes to prevent mixing a room id with a user id
//! at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// An opaque room identifier.
///
/// Every peer holding the same room id derives the same room key, so the
/// identifier doubles as the room's only shared secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Create a room id, rejecting empty strings.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::EmptyIdentifier("room id"));
        }
        Ok(Self(id))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A caller-supplied user identifier.
///
/// The relay never verifies it; two sessions may even claim the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user id, rejecting empty strings.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::EmptyIdentifier("user id"));
        }
        Ok(Self(id))
    }

    /// Generate a throwaway id of the form `client-NNNN`.
    pub fn random() -> Self {
        let bytes = *Uuid::new_v4().as_bytes();
        let n = u16::from_be_bytes([bytes[0], bytes[1]]);
        Self(format!("client-{}", n % 10_000))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty (possible only for values read off the wire).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A 128-bit transfer identifier.
///
/// Travels as 16 raw bytes in frame headers and as a hyphenated UUID string
/// in control messages.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Generate a random (v4) transfer id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from the raw 16 header bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get the raw bytes as written into a frame header.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Convert to lowercase hex without separators.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl fmt::Debug for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferId({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TransferId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidTransferId(e.to_string()))
    }
}

impl From<[u8; 16]> for TransferId {
    fn from(bytes: [u8; 16]) -> Self {
        Self::from_bytes(bytes)
    }
}

/// The operating system tag this process reports when joining a room.
pub fn local_os() -> String {
    std::env::consts::OS.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_rejects_empty() {
        assert!(RoomId::new("").is_err());
        assert_eq!(RoomId::new("abc123").unwrap().as_str(), "abc123");
    }

    #[test]
    fn test_transfer_id_string_roundtrip() {
        let id = TransferId::random();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(text.parse::<TransferId>().unwrap(), id);
    }

    #[test]
    fn test_transfer_id_raw_bytes() {
        let id = TransferId::from_bytes([0xab; 16]);
        assert_eq!(id.as_bytes(), &[0xab; 16]);
        assert_eq!(id.to_hex(), "ab".repeat(16));
    }

    #[test]
    fn test_transfer_id_serializes_hyphenated() {
        let id = TransferId::from_bytes([0x11; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"11111111-1111-1111-1111-111111111111\"");
    }

    #[test]
    fn test_random_user_id_shape() {
        let id = UserId::random();
        assert!(id.as_str().starts_with("client-"));
    }
}
