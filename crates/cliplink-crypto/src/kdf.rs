//! Room key derivation.
//!
//! The room key is Argon2id(password = room id, salt = configured salt).
//! Salt and cost parameters are configuration, not literals, because the
//! room id is the only secret: weakening them weakens every room.

use argon2::{Algorithm, Argon2, Params, Version};

use cliplink_core::RoomId;

use crate::crypto::{RoomKey, KEY_SIZE};
use crate::error::{CryptoError, Result};

/// Argon2 rejects salts shorter than this.
const MIN_SALT_LEN: usize = 8;

/// Argon2id parameters for room key derivation.
///
/// Every peer of a room must use identical values or they will derive
/// different keys and fail to open each other's payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfConfig {
    /// Salt mixed into every derivation (at least 8 bytes).
    pub salt: String,
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
}

impl KdfConfig {
    /// Minimal-cost parameters for tests and constrained devices.
    ///
    /// Still Argon2id, but cheap enough to run in every unit test.
    pub fn light() -> Self {
        Self {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
            ..Self::default()
        }
    }

    fn params(&self) -> Result<Params> {
        if self.salt.len() < MIN_SALT_LEN {
            return Err(CryptoError::KeyDerivation(format!(
                "salt must be at least {} bytes, got {}",
                MIN_SALT_LEN,
                self.salt.len()
            )));
        }
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
    }
}

impl Default for KdfConfig {
    /// OWASP minimum for Argon2id: 19 MiB, 2 passes, 1 lane.
    fn default() -> Self {
        Self {
            salt: "cliplink/room-key/v1".to_string(),
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Derive the room key for `room`.
///
/// Deterministic for a given room id and config. CPU and memory heavy;
/// async callers should run it on a blocking worker.
pub fn derive_room_key(room: &RoomId, config: &KdfConfig) -> Result<RoomKey> {
    let params = config.params()?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(room.as_str().as_bytes(), config.salt.as_bytes(), &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    tracing::debug!(room = %room, "derived room key");
    Ok(RoomKey::from_bytes(key))
}
