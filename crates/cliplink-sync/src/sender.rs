//! Outbound chunked transfers.
//!
//! A transfer is a `start` control message, `total` sealed frames on the
//! file channel, then an `end` control message. After each frame the sender
//! checks the file channel's buffered amount and waits for the low-water
//! signal once it reaches the threshold.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};

use cliplink_core::{TransferId, UserId};
use cliplink_crypto::{compress, Envelope, RoomKey, DEFAULT_COMPRESSION_LEVEL};

use crate::error::{Result, SyncError};
use crate::frame::ChunkFrame;
use crate::messages::{ControlMessage, FileTransferMessage};
use crate::transport::DataChannel;

/// Configuration for outbound transfers.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Plaintext bytes per chunk.
    pub chunk_size: usize,
    /// Buffered amount at which the sender pauses.
    pub low_water_mark: usize,
    /// zstd level.
    pub compression_level: i32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16 * 1024,
            low_water_mark: 64 * 1024,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl TransferConfig {
    /// Number of frames for a payload of `len` bytes (an empty payload is
    /// one empty frame).
    pub fn chunk_count(&self, len: u64) -> Result<u32> {
        let chunk = self.chunk_size.max(1) as u64;
        let count = len.div_ceil(chunk).max(1);
        u32::try_from(count).map_err(|_| SyncError::PayloadTooLarge(len))
    }
}

/// Summary of a finished outbound transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub transfer_id: TransferId,
    pub total_chunks: u32,
    pub bytes: u64,
}

/// Sends transfers to one peer.
pub struct TransferSender<C: DataChannel> {
    control: Arc<C>,
    file: Arc<C>,
    key: RoomKey,
    sender_id: UserId,
    config: TransferConfig,
}

impl<C: DataChannel> TransferSender<C> {
    pub fn new(
        control: Arc<C>,
        file: Arc<C>,
        key: RoomKey,
        sender_id: UserId,
        config: TransferConfig,
    ) -> Self {
        Self {
            control,
            file,
            key,
            sender_id,
            config,
        }
    }

    /// Send a file from disk under its base name.
    pub async fn send_file(&self, path: &Path) -> Result<TransferReport> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        self.send_reader(&name, file, len).await
    }

    /// Send an in-memory payload.
    pub async fn send_bytes(&self, file_name: &str, data: &[u8]) -> Result<TransferReport> {
        self.send_reader(file_name, data, data.len() as u64).await
    }

    /// Send exactly `len` bytes read from `reader`.
    pub async fn send_reader<R>(&self, file_name: &str, mut reader: R, len: u64) -> Result<TransferReport>
    where
        R: AsyncRead + Unpin + Send,
    {
        let transfer_id = TransferId::random();
        let total = self.config.chunk_count(len)?;

        self.send_control(&ControlMessage::FileTransfer(FileTransferMessage::Start {
            transfer_id,
            file_name: Envelope::seal_str(file_name, &self.key)?,
            sender_id: self.sender_id.clone(),
            total_chunks: total,
        }))?;

        let mut remaining = len;
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        for index in 0..total {
            let take = remaining.min(buf.len() as u64) as usize;
            reader.read_exact(&mut buf[..take]).await?;
            remaining -= take as u64;

            let packed = compress(&buf[..take], self.config.compression_level)?;
            let frame = ChunkFrame::seal(&self.key, transfer_id, index, total, &packed)?;
            self.file.send(frame.encode())?;

            if self.file.buffered_amount() >= self.config.low_water_mark {
                self.file
                    .wait_buffered_amount_low(self.config.low_water_mark)
                    .await;
            }
        }

        self.send_control(&ControlMessage::FileTransfer(FileTransferMessage::End {
            transfer_id,
            sender_id: self.sender_id.clone(),
        }))?;

        tracing::debug!(transfer = %transfer_id, name = %file_name, chunks = total, bytes = len, "transfer sent");
        Ok(TransferReport {
            transfer_id,
            total_chunks: total,
            bytes: len,
        })
    }

    fn send_control(&self, message: &ControlMessage) -> Result<()> {
        self.control.send(message.encode()?.into())
    }
}
