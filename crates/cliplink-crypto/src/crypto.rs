//! ChaCha20-Poly1305 sealing under a room key.
//!
//! The tag is kept detached from the ciphertext so that chunk frames can
//! place nonce and tag at fixed header offsets.

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Key, Nonce, Tag,
};
use rand::RngCore;
use std::fmt;

use crate::error::{CryptoError, Result};

/// Size of a room key in bytes (256-bit).
pub const KEY_SIZE: usize = 32;

/// Size of a nonce in bytes (96-bit).
pub const NONCE_SIZE: usize = 12;

/// Size of an authentication tag in bytes (128-bit).
pub const TAG_SIZE: usize = 16;

/// A 256-bit symmetric key shared by every member of a room.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomKey([u8; KEY_SIZE]);

impl RoomKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Seal `plaintext` with a freshly generated nonce.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Sealed> {
        let nonce = EncryptionNonce::generate();
        let (ciphertext, tag) = self.seal_with_nonce(plaintext, aad, &nonce)?;
        Ok(Sealed {
            nonce,
            ciphertext,
            tag,
        })
    }

    /// Seal with a caller-provided nonce.
    ///
    /// A nonce must never be reused under the same key; production paths go
    /// through [`RoomKey::seal`].
    pub fn seal_with_nonce(
        &self,
        plaintext: &[u8],
        aad: &[u8],
        nonce: &EncryptionNonce,
    ) -> Result<(Vec<u8>, AuthTag)> {
        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher()
            .encrypt_in_place_detached(Nonce::from_slice(&nonce.0), aad, &mut buffer)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(tag.as_slice());
        Ok((buffer, AuthTag(tag_bytes)))
    }

    /// Open a detached ciphertext.
    ///
    /// Returns an error on any authentication failure; no plaintext is
    /// released in that case.
    pub fn open(
        &self,
        ciphertext: &[u8],
        aad: &[u8],
        nonce: &EncryptionNonce,
        tag: &AuthTag,
    ) -> Result<Vec<u8>> {
        let mut buffer = ciphertext.to_vec();
        self.cipher()
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce.0),
                aad,
                &mut buffer,
                Tag::from_slice(&tag.0),
            )
            .map_err(|e| CryptoError::Decryption(e.to_string()))?;
        Ok(buffer)
    }
}

impl fmt::Debug for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RoomKey(..)")
    }
}

/// A 96-bit nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionNonce(pub [u8; NONCE_SIZE]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// A 128-bit Poly1305 authentication tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthTag(pub [u8; TAG_SIZE]);

impl AuthTag {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; TAG_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; TAG_SIZE] {
        &self.0
    }
}

/// Output of [`RoomKey::seal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: EncryptionNonce,
    pub ciphertext: Vec<u8>,
    pub tag: AuthTag,
}

impl Sealed {
    /// Open with the given key and associated data.
    pub fn open(&self, key: &RoomKey, aad: &[u8]) -> Result<Vec<u8>> {
        key.open(&self.ciphertext, aad, &self.nonce, &self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> RoomKey {
        RoomKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn test_seal_open() {
        let key = key(0x42);
        let sealed = key.seal(b"hello, world!", b"").unwrap();

        assert_ne!(sealed.ciphertext, b"hello, world!");
        assert_eq!(sealed.open(&key, b"").unwrap(), b"hello, world!");
    }

    #[test]
    fn test_ciphertext_len_matches_plaintext() {
        let sealed = key(1).seal(&[7u8; 100], b"").unwrap();
        assert_eq!(sealed.ciphertext.len(), 100);
    }

    #[test]
    fn test_open_wrong_key_fails() {
        let sealed = key(1).seal(b"secret", b"").unwrap();
        assert!(sealed.open(&key(2), b"").is_err());
    }

    #[test]
    fn test_open_wrong_aad_fails() {
        let key = key(1);
        let sealed = key.seal(b"secret", b"chunk-0").unwrap();
        assert!(sealed.open(&key, b"chunk-1").is_err());
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = key(1);
        let mut sealed = key.seal(b"secret", b"").unwrap();
        sealed.tag.0[0] ^= 0x01;
        assert!(matches!(
            sealed.open(&key, b""),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let key = key(1);
        let a = key.seal(b"same", b"").unwrap();
        let b = key.seal(b"same", b"").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_debug_hides_key() {
        assert_eq!(format!("{:?}", key(9)), "RoomKey(..)");
    }
}
