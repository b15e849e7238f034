//! Test fixtures and helpers.
//!
//! Common setup code for transfer and controller tests.

use bytes::Bytes;

use cliplink_core::{RoomId, TransferId, UserId};
use cliplink_crypto::{
    compress, derive_room_key, Envelope, KdfConfig, RoomKey, DEFAULT_COMPRESSION_LEVEL,
};
use cliplink_sync::{ChunkFrame, ControlMessage, FileTransferMessage};

/// A room and the key every member derives for it.
pub struct RoomFixture {
    pub room: RoomId,
    pub key: RoomKey,
}

impl RoomFixture {
    /// Derive the key with the light KDF profile.
    ///
    /// Panics on an invalid room id.
    pub fn new(room: &str) -> Self {
        let room = RoomId::new(room).expect("valid room id");
        let key = derive_room_key(&room, &KdfConfig::light()).expect("key derivation");
        Self { room, key }
    }

    /// Use a fixed key instead of deriving one.
    pub fn with_key(room: &str, key: RoomKey) -> Self {
        Self {
            room: RoomId::new(room).expect("valid room id"),
            key,
        }
    }

    /// Use a random key; no KDF cost.
    pub fn random(room: &str) -> Self {
        Self::with_key(room, RoomKey::from_bytes(rand::random()))
    }

    /// Seal `data` as a complete transfer split into `chunk_size` pieces.
    pub fn transfer(&self, file_name: &str, data: &[u8], chunk_size: usize) -> TransferFixture {
        let transfer_id = TransferId::random();
        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![&[]]
        } else {
            data.chunks(chunk_size.max(1)).collect()
        };
        let total = chunks.len() as u32;

        let frames = chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                let packed = compress(chunk, DEFAULT_COMPRESSION_LEVEL).expect("compress");
                ChunkFrame::seal(&self.key, transfer_id, index as u32, total, &packed)
                    .expect("seal")
                    .encode()
            })
            .collect();

        TransferFixture {
            transfer_id,
            file_name: Envelope::seal_str(file_name, &self.key).expect("seal name"),
            total,
            frames,
        }
    }
}

/// A sealed transfer ready to feed to a receiver.
#[derive(Debug, Clone)]
pub struct TransferFixture {
    pub transfer_id: TransferId,
    pub file_name: Envelope,
    pub total: u32,
    /// Encoded frames in index order.
    pub frames: Vec<Bytes>,
}

impl TransferFixture {
    pub fn start(&self, sender: &UserId) -> ControlMessage {
        ControlMessage::FileTransfer(FileTransferMessage::Start {
            transfer_id: self.transfer_id,
            file_name: self.file_name.clone(),
            sender_id: sender.clone(),
            total_chunks: self.total,
        })
    }

    pub fn end(&self, sender: &UserId) -> ControlMessage {
        ControlMessage::FileTransfer(FileTransferMessage::End {
            transfer_id: self.transfer_id,
            sender_id: sender.clone(),
        })
    }

    /// Frames reordered by `order` (a permutation of frame indices).
    pub fn frames_in_order(&self, order: &[usize]) -> Vec<Bytes> {
        order.iter().map(|&i| self.frames[i].clone()).collect()
    }
}

/// Fixtures for `n` distinct rooms.
pub fn multi_room_fixtures(n: usize) -> Vec<RoomFixture> {
    (0..n)
        .map(|i| RoomFixture::new(&format!("room-{}", i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cliplink_core::HistoryEntry;
    use cliplink_crypto::KEY_SIZE;
    use cliplink_sync::{MemorySinkProvider, Reassembler, ReassemblyConfig, TransferOutcome};

    #[test]
    fn test_same_room_same_key() {
        let a = RoomFixture::new("abc123");
        let b = RoomFixture::new("abc123");
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn test_multi_room_fixtures_distinct() {
        let rooms = multi_room_fixtures(3);
        assert_ne!(rooms[0].key, rooms[1].key);
        assert_ne!(rooms[1].key, rooms[2].key);
    }

    #[test]
    fn test_empty_payload_is_one_frame() {
        let room = RoomFixture::random("abc123");
        let transfer = room.transfer("empty.txt", b"", 16);
        assert_eq!(transfer.total, 1);
        assert_eq!(transfer.frames.len(), 1);
    }

    #[tokio::test]
    async fn test_report_pdf_out_of_order() {
        let room = RoomFixture::with_key("abc123", RoomKey::from_bytes([5; KEY_SIZE]));
        let content: Vec<u8> = (0..40 * 1024u32).map(|i| (i % 251) as u8).collect();
        let transfer = room.transfer("report.pdf", &content, 16 * 1024);
        let sender = UserId::from("a");
        assert_eq!(transfer.total, 3);

        let mut receiver = Reassembler::new(MemorySinkProvider::new(), ReassemblyConfig::default());
        receiver
            .handle_start(&room.key, &sender, transfer.transfer_id, &transfer.file_name, transfer.total)
            .await;
        for frame in transfer.frames_in_order(&[1, 0, 2]) {
            receiver.handle_frame(&room.key, &sender, &frame).await;
        }
        let outcome = receiver.handle_end(&sender, transfer.transfer_id).await;

        let file = match outcome {
            Some(TransferOutcome::Completed { file, .. }) => file,
            other => panic!("expected completion, got {:?}", other),
        };
        assert_eq!(file.name, "report.pdf");
        assert_eq!(
            HistoryEntry::received_file(&file.name, sender).content,
            "File received: report.pdf"
        );
        assert_eq!(receiver.provider().finished().await[0].1, content);
    }

    #[tokio::test]
    async fn test_wrong_room_key_fails() {
        let room = RoomFixture::with_key("abc123", RoomKey::from_bytes([5; KEY_SIZE]));
        let other = RoomFixture::with_key("xyz789", RoomKey::from_bytes([6; KEY_SIZE]));
        let transfer = room.transfer("secret.txt", b"top secret", 4);
        let sender = UserId::from("a");

        let mut receiver = Reassembler::new(MemorySinkProvider::new(), ReassemblyConfig::default());
        let outcome = receiver
            .handle_start(&other.key, &sender, transfer.transfer_id, &transfer.file_name, transfer.total)
            .await;

        assert!(matches!(outcome, Some(TransferOutcome::Failed { .. })));
        assert!(receiver.provider().finished().await.is_empty());
    }
}
