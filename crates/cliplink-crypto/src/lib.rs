//! # Cliplink Crypto
//!
//! Room-scoped encryption for clipboard payloads.
//!
//! ## Overview
//!
//! Every peer in a room derives the same 256-bit [`RoomKey`] from the room
//! identifier alone, using Argon2id with an explicit salt and cost
//! parameters ([`KdfConfig`]). The key seals:
//!
//! - whole control payloads, as self-describing [`Envelope`]s (hex encoded
//!   nonce, ciphertext and tag), and
//! - each chunk of a chunked transfer independently, with the nonce and tag
//!   carried in the frame header.
//!
//! Every seal draws a fresh random 96-bit nonce. Opening fails closed: a tag
//! mismatch or a malformed envelope is an error, never partial plaintext.
//!
//! ## Compression
//!
//! Transfer chunks are zstd-compressed before sealing; see [`compress`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cliplink_core::RoomId;
//! use cliplink_crypto::{derive_room_key, Envelope, KdfConfig};
//!
//! let room = RoomId::new("abc123").unwrap();
//! let key = derive_room_key(&room, &KdfConfig::default()).unwrap();
//!
//! let envelope = Envelope::seal(b"copied text", &key).unwrap();
//! assert_eq!(envelope.open(&key).unwrap(), b"copied text");
//! ```

pub mod compress;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod kdf;

pub use compress::{compress, decompress, DEFAULT_COMPRESSION_LEVEL};
pub use crypto::{AuthTag, EncryptionNonce, RoomKey, Sealed, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use envelope::{Envelope, EnvelopeFormat};
pub use error::{CryptoError, Result};
pub use kdf::{derive_room_key, KdfConfig};
