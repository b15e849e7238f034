//! Encrypted payload envelope.
//!
//! Control payloads (clipboard text, transfer file names) are sealed into an
//! [`Envelope`] that carries everything needed to open it except the key:
//! the algorithm, nonce, ciphertext and tag. On the wire it is a JSON object
//! with hex-encoded byte fields.

use serde::{Deserialize, Serialize};

use crate::crypto::{AuthTag, EncryptionNonce, RoomKey, NONCE_SIZE, TAG_SIZE};
use crate::error::{CryptoError, Result};

/// Format identifier for envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeFormat {
    /// ChaCha20-Poly1305 with a 256-bit key, 96-bit nonce, 128-bit tag.
    #[default]
    Chacha20Poly1305,
}

/// A sealed, self-describing payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Encryption algorithm used.
    #[serde(default)]
    pub format: EnvelopeFormat,

    /// Nonce used for this seal (unique per seal).
    #[serde(with = "hex")]
    pub nonce: Vec<u8>,

    /// The encrypted data, without the tag.
    #[serde(with = "hex")]
    pub ciphertext: Vec<u8>,

    /// Poly1305 authentication tag.
    #[serde(with = "hex")]
    pub tag: Vec<u8>,
}

impl Envelope {
    /// Seal plaintext with the room key and a fresh nonce.
    pub fn seal(plaintext: &[u8], key: &RoomKey) -> Result<Self> {
        let sealed = key.seal(plaintext, &[])?;

        Ok(Self {
            format: EnvelopeFormat::Chacha20Poly1305,
            nonce: sealed.nonce.as_bytes().to_vec(),
            ciphertext: sealed.ciphertext,
            tag: sealed.tag.as_bytes().to_vec(),
        })
    }

    /// Seal a UTF-8 string.
    pub fn seal_str(text: &str, key: &RoomKey) -> Result<Self> {
        Self::seal(text.as_bytes(), key)
    }

    /// Open with the room key.
    ///
    /// Fails on a wrong key, any tampering, or a nonce/tag of the wrong size.
    pub fn open(&self, key: &RoomKey) -> Result<Vec<u8>> {
        match self.format {
            EnvelopeFormat::Chacha20Poly1305 => {
                let nonce: [u8; NONCE_SIZE] = self.nonce.as_slice().try_into().map_err(|_| {
                    CryptoError::MalformedEnvelope(format!(
                        "nonce must be {} bytes, got {}",
                        NONCE_SIZE,
                        self.nonce.len()
                    ))
                })?;
                let tag: [u8; TAG_SIZE] = self.tag.as_slice().try_into().map_err(|_| {
                    CryptoError::MalformedEnvelope(format!(
                        "tag must be {} bytes, got {}",
                        TAG_SIZE,
                        self.tag.len()
                    ))
                })?;

                key.open(
                    &self.ciphertext,
                    &[],
                    &EncryptionNonce::from_bytes(nonce),
                    &AuthTag::from_bytes(tag),
                )
            }
        }
    }

    /// Open and decode as UTF-8.
    pub fn open_string(&self, key: &RoomKey) -> Result<String> {
        String::from_utf8(self.open(key)?).map_err(|_| CryptoError::InvalidUtf8)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))
    }

    /// Get the size of the ciphertext.
    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_SIZE;
    use proptest::prelude::*;

    fn key(byte: u8) -> RoomKey {
        RoomKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = key(0x42);
        let envelope = Envelope::seal(b"hello, encrypted world!", &key).unwrap();
        assert_eq!(envelope.open(&key).unwrap(), b"hello, encrypted world!");
    }

    #[test]
    fn test_empty_plaintext() {
        let key = key(0x42);
        let envelope = Envelope::seal(b"", &key).unwrap();
        assert_eq!(envelope.ciphertext_len(), 0);
        assert_eq!(envelope.open(&key).unwrap(), b"");
    }

    #[test]
    fn test_json_shape() {
        let envelope = Envelope::seal_str("x", &key(1)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(value["format"], "chacha20-poly1305");
        assert_eq!(value["nonce"].as_str().unwrap().len(), NONCE_SIZE * 2);
        assert_eq!(value["tag"].as_str().unwrap().len(), TAG_SIZE * 2);
    }

    #[test]
    fn test_json_roundtrip_opens() {
        let key = key(3);
        let json = Envelope::seal_str("clipboard text", &key).unwrap().to_json().unwrap();
        let parsed = Envelope::from_json(&json).unwrap();
        assert_eq!(parsed.open_string(&key).unwrap(), "clipboard text");
    }

    #[test]
    fn test_wrong_key_fails() {
        let envelope = Envelope::seal(b"secret", &key(1)).unwrap();
        assert!(matches!(envelope.open(&key(2)), Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn test_truncated_nonce_is_malformed() {
        let key = key(1);
        let mut envelope = Envelope::seal(b"secret", &key).unwrap();
        envelope.nonce.pop();
        assert!(matches!(envelope.open(&key), Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_bad_hex_is_malformed() {
        let json = r#"{"nonce":"zz","ciphertext":"","tag":""}"#;
        assert!(matches!(Envelope::from_json(json), Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_format_defaults_when_absent() {
        let key = key(5);
        let envelope = Envelope::seal(b"abc", &key).unwrap();
        let json = format!(
            r#"{{"nonce":"{}","ciphertext":"{}","tag":"{}"}}"#,
            hex::encode(&envelope.nonce),
            hex::encode(&envelope.ciphertext),
            hex::encode(&envelope.tag)
        );
        assert_eq!(Envelope::from_json(&json).unwrap().open(&key).unwrap(), b"abc");
    }

    proptest! {
        #[test]
        fn test_any_plaintext_roundtrips(data in prop::collection::vec(any::<u8>(), 0..2048)) {
            let key = key(0x24);
            let envelope = Envelope::seal(&data, &key).unwrap();
            prop_assert_eq!(envelope.open(&key).unwrap(), data);
        }

        #[test]
        fn test_any_ciphertext_flip_fails(
            data in prop::collection::vec(any::<u8>(), 1..512),
            index in any::<prop::sample::Index>(),
        ) {
            let key = key(0x24);
            let mut envelope = Envelope::seal(&data, &key).unwrap();
            let i = index.index(envelope.ciphertext.len());
            envelope.ciphertext[i] ^= 0x80;
            prop_assert!(envelope.open(&key).is_err());
        }
    }
}
