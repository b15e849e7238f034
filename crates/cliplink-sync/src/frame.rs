//! Chunk frame codec.
//!
//! ```text
//! offset  len  field
//!      0   16  transfer id (raw)
//!     16    4  chunk index (u32 BE)
//!     20    4  total chunks (u32 BE, 0 = unknown)
//!     24   12  nonce
//!     36   16  tag
//!     52    n  ciphertext of the compressed chunk
//! ```
//!
//! The AEAD associated data binds each ciphertext to its transfer id and
//! chunk index.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use cliplink_core::TransferId;
use cliplink_crypto::{AuthTag, EncryptionNonce, RoomKey, NONCE_SIZE, TAG_SIZE};

use crate::error::{Result, SyncError};

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 16 + 4 + 4 + NONCE_SIZE + TAG_SIZE;

/// Associated data length: transfer id plus index.
const AAD_LEN: usize = 16 + 4;

/// One sealed chunk of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    pub transfer_id: TransferId,
    pub index: u32,
    pub total: u32,
    pub nonce: EncryptionNonce,
    pub tag: AuthTag,
    pub ciphertext: Bytes,
}

impl ChunkFrame {
    /// Seal an already compressed chunk with a fresh nonce.
    pub fn seal(
        key: &RoomKey,
        transfer_id: TransferId,
        index: u32,
        total: u32,
        compressed: &[u8],
    ) -> Result<Self> {
        let sealed = key.seal(compressed, &associated_data(&transfer_id, index))?;
        Ok(Self {
            transfer_id,
            index,
            total,
            nonce: sealed.nonce,
            tag: sealed.tag,
            ciphertext: Bytes::from(sealed.ciphertext),
        })
    }

    /// Authenticate and decrypt, returning the compressed chunk.
    pub fn open(&self, key: &RoomKey) -> Result<Vec<u8>> {
        let aad = associated_data(&self.transfer_id, self.index);
        Ok(key.open(&self.ciphertext, &aad, &self.nonce, &self.tag)?)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.ciphertext.len());
        buf.put_slice(self.transfer_id.as_bytes());
        buf.put_u32(self.index);
        buf.put_u32(self.total);
        buf.put_slice(self.nonce.as_bytes());
        buf.put_slice(self.tag.as_bytes());
        buf.put_slice(&self.ciphertext);
        buf.freeze()
    }

    /// Parse a frame. The ciphertext shares the input buffer.
    pub fn decode(data: &Bytes) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(SyncError::ShortFrame(data.len()));
        }

        let mut header = &data[..HEADER_LEN];

        let mut id = [0u8; 16];
        header.copy_to_slice(&mut id);
        let index = header.get_u32();
        let total = header.get_u32();
        let mut nonce = [0u8; NONCE_SIZE];
        header.copy_to_slice(&mut nonce);
        let mut tag = [0u8; TAG_SIZE];
        header.copy_to_slice(&mut tag);

        Ok(Self {
            transfer_id: TransferId::from_bytes(id),
            index,
            total,
            nonce: EncryptionNonce::from_bytes(nonce),
            tag: AuthTag::from_bytes(tag),
            ciphertext: data.slice(HEADER_LEN..),
        })
    }
}

/// Transfer id and index. The chunk count is checked against the
/// transfer's state by the reassembler instead.
fn associated_data(transfer_id: &TransferId, index: u32) -> [u8; AAD_LEN] {
    let mut aad = [0u8; AAD_LEN];
    aad[..16].copy_from_slice(transfer_id.as_bytes());
    aad[16..].copy_from_slice(&index.to_be_bytes());
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use cliplink_crypto::KEY_SIZE;

    fn key() -> RoomKey {
        RoomKey::from_bytes([3; KEY_SIZE])
    }

    #[test]
    fn test_header_len() {
        assert_eq!(HEADER_LEN, 52);
    }

    #[test]
    fn test_layout() {
        let frame = ChunkFrame {
            transfer_id: TransferId::from_bytes([0xaa; 16]),
            index: 2,
            total: 3,
            nonce: EncryptionNonce::from_bytes([0xbb; NONCE_SIZE]),
            tag: AuthTag::from_bytes([0xcc; TAG_SIZE]),
            ciphertext: Bytes::from_static(b"xyz"),
        };
        let wire = frame.encode();

        assert_eq!(wire.len(), 55);
        assert_eq!(&wire[..16], &[0xaa; 16]);
        assert_eq!(&wire[16..20], &[0, 0, 0, 2]);
        assert_eq!(&wire[20..24], &[0, 0, 0, 3]);
        assert_eq!(&wire[24..36], &[0xbb; 12]);
        assert_eq!(&wire[36..52], &[0xcc; 16]);
        assert_eq!(&wire[52..], b"xyz");
        assert_eq!(ChunkFrame::decode(&wire).unwrap(), frame);
    }

    #[test]
    fn test_short_frame() {
        let data = Bytes::from(vec![0u8; HEADER_LEN - 1]);
        assert!(matches!(ChunkFrame::decode(&data), Err(SyncError::ShortFrame(51))));
    }

    #[test]
    fn test_header_only_frame_is_empty_chunk() {
        let data = Bytes::from(vec![0u8; HEADER_LEN]);
        assert!(ChunkFrame::decode(&data).unwrap().ciphertext.is_empty());
    }

    #[test]
    fn test_seal_open() {
        let id = TransferId::random();
        let frame = ChunkFrame::seal(&key(), id, 0, 1, b"compressed").unwrap();
        let parsed = ChunkFrame::decode(&frame.encode()).unwrap();
        assert_eq!(parsed.open(&key()).unwrap(), b"compressed");
    }

    #[test]
    fn test_moved_index_fails() {
        let id = TransferId::random();
        let mut frame = ChunkFrame::seal(&key(), id, 0, 2, b"chunk").unwrap();
        frame.index = 1;
        assert!(frame.open(&key()).is_err());
    }

    #[test]
    fn test_moved_transfer_fails() {
        let mut frame = ChunkFrame::seal(&key(), TransferId::random(), 0, 1, b"chunk").unwrap();
        frame.transfer_id = TransferId::random();
        assert!(frame.open(&key()).is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..128)) {
                let data = Bytes::from(data);
                match ChunkFrame::decode(&data) {
                    Ok(frame) => {
                        prop_assert!(data.len() >= HEADER_LEN);
                        prop_assert_eq!(frame.encode(), data);
                    }
                    Err(_) => prop_assert!(data.len() < HEADER_LEN),
                }
            }

            #[test]
            fn prop_any_header_byte_flip_fails_open(byte in 0usize..HEADER_LEN, bit in 0u8..8) {
                let frame = ChunkFrame::seal(&key(), TransferId::from_bytes([4; 16]), 2, 5, b"payload").unwrap();
                let mut raw = frame.encode().to_vec();
                raw[byte] ^= 1 << bit;
                let tampered = ChunkFrame::decode(&Bytes::from(raw)).unwrap();
                // The tag leaves the total out; the reassembler rejects a
                // total that contradicts the transfer's known count.
                if (20..24).contains(&byte) {
                    prop_assert!(tampered.open(&key()).is_ok());
                } else {
                    prop_assert!(tampered.open(&key()).is_err());
                }
            }
        }
    }
}
