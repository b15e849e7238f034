//! Transfer reassembly.
//!
//! Frames may arrive in any order, and before or after the `start` message
//! that names the file. The [`Reassembler`] tracks every in-flight transfer:
//!
//! - `next_index` only grows; a frame below it is a duplicate and dropped.
//! - Frames above it (or any frame before `start` provides a sink) wait in a
//!   bounded buffer.
//! - Delivering the frame at `next_index` drains all contiguous successors
//!   in the same pass.
//! - A transfer completes once `end` was seen, `total > 0` and
//!   `next_index >= total`.
//!
//! Any authentication, decompression or sink failure aborts the whole
//! transfer and discards its partial output, as does a frame whose total
//! contradicts the known one. A transfer that sees no traffic for
//! `idle_timeout` is evicted by [`Reassembler::evict_idle`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use cliplink_core::{TransferId, UserId};
use cliplink_crypto::{decompress, Envelope, RoomKey};

use crate::frame::ChunkFrame;
use crate::sink::{ReceivedFile, SinkProvider, TransferSink};

/// Configuration for reassembly limits.
#[derive(Debug, Clone)]
pub struct ReassemblyConfig {
    /// Out-of-order frames buffered per transfer.
    pub max_buffered_chunks: usize,
    /// Transfers tracked at once.
    pub max_transfers: usize,
    /// Upper bound on one decompressed chunk.
    pub max_chunk_len: usize,
    /// Finished (completed or aborted) transfer ids remembered to reject
    /// late frames.
    pub finished_history: usize,
    /// Transfers without any traffic for this long are aborted.
    pub idle_timeout: Duration,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            max_buffered_chunks: 4096,
            max_transfers: 64,
            max_chunk_len: 16 * 1024,
            finished_history: 256,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Terminal result of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed {
        transfer_id: TransferId,
        sender: UserId,
        file: ReceivedFile,
    },
    Failed {
        transfer_id: TransferId,
        sender: UserId,
        reason: String,
    },
}

struct Transfer {
    sender: UserId,
    total: u32,
    next_index: u32,
    buffered: BTreeMap<u32, ChunkFrame>,
    ended: bool,
    sink: Option<Box<dyn TransferSink>>,
    last_activity: Instant,
}

impl Transfer {
    fn new(sender: UserId) -> Self {
        Self {
            sender,
            total: 0,
            next_index: 0,
            buffered: BTreeMap::new(),
            ended: false,
            sink: None,
            last_activity: Instant::now(),
        }
    }

    fn is_complete(&self) -> bool {
        self.ended && self.total > 0 && self.next_index >= self.total && self.sink.is_some()
    }

    /// Adopt a total from the wire. Returns false on a conflicting value.
    fn adopt_total(&mut self, total: u32) -> bool {
        if total == 0 || self.total == total {
            true
        } else if self.total == 0 {
            self.total = total;
            true
        } else {
            false
        }
    }
}

/// What to do with a transfer after a step.
enum Step {
    Keep(Transfer),
    Abort(Transfer, String),
}

/// Reassembles inbound transfers into sinks.
pub struct Reassembler<P: SinkProvider> {
    provider: P,
    config: ReassemblyConfig,
    transfers: HashMap<TransferId, Transfer>,
    finished: VecDeque<TransferId>,
}

impl<P: SinkProvider> Reassembler<P> {
    pub fn new(provider: P, config: ReassemblyConfig) -> Self {
        Self {
            provider,
            config,
            transfers: HashMap::new(),
            finished: VecDeque::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Number of transfers in flight.
    pub fn active(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_tracking(&self, id: &TransferId) -> bool {
        self.transfers.contains_key(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound events
    // ─────────────────────────────────────────────────────────────────────────

    /// Handle a `start` message: open the file name and create the sink.
    pub async fn handle_start(
        &mut self,
        key: &RoomKey,
        sender: &UserId,
        transfer_id: TransferId,
        file_name: &Envelope,
        total_chunks: u32,
    ) -> Option<TransferOutcome> {
        let mut transfer = self.take_or_create(transfer_id, sender)?;

        if transfer.sink.is_some() {
            tracing::debug!(transfer = %transfer_id, "duplicate start ignored");
            return self.settle(transfer_id, Step::Keep(transfer)).await;
        }

        let name = match file_name.open_string(key) {
            Ok(name) => name,
            Err(e) => {
                let step = Step::Abort(transfer, format!("file name: {}", e));
                return self.settle(transfer_id, step).await;
            }
        };
        if !transfer.adopt_total(total_chunks) {
            let step = Step::Abort(transfer, "conflicting chunk count".into());
            return self.settle(transfer_id, step).await;
        }

        let step = match self.provider.create(&name).await {
            Ok(sink) => {
                tracing::debug!(transfer = %transfer_id, name = %name, total = total_chunks, "transfer started");
                transfer.sink = Some(sink);
                Self::drain(key, self.config.max_chunk_len, transfer).await
            }
            Err(e) => Step::Abort(transfer, format!("sink: {}", e)),
        };

        self.settle(transfer_id, step).await
    }

    /// Handle one binary frame from the file channel.
    pub async fn handle_frame(
        &mut self,
        key: &RoomKey,
        sender: &UserId,
        data: &Bytes,
    ) -> Option<TransferOutcome> {
        let frame = match ChunkFrame::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(sender = %sender, error = %e, "dropping frame");
                return None;
            }
        };
        let transfer_id = frame.transfer_id;
        let mut transfer = self.take_or_create(transfer_id, sender)?;

        if !transfer.adopt_total(frame.total) {
            // The total is outside the AEAD associated data; a mismatch means
            // a corrupted or forged header.
            let step = Step::Abort(transfer, format!("chunk {}: conflicting chunk count", frame.index));
            return self.settle(transfer_id, step).await;
        }
        if transfer.total > 0 && frame.index >= transfer.total {
            tracing::warn!(transfer = %transfer_id, index = frame.index, total = transfer.total, "dropping out-of-range frame");
            return self.settle(transfer_id, Step::Keep(transfer)).await;
        }
        if frame.index < transfer.next_index {
            tracing::trace!(transfer = %transfer_id, index = frame.index, "dropping duplicate frame");
            return self.settle(transfer_id, Step::Keep(transfer)).await;
        }

        let max_chunk_len = self.config.max_chunk_len;
        let step = if transfer.sink.is_some() && frame.index == transfer.next_index {
            match Self::deliver(key, max_chunk_len, &mut transfer, &frame).await {
                Ok(()) => Self::drain(key, max_chunk_len, transfer).await,
                Err(reason) => Step::Abort(transfer, reason),
            }
        } else if transfer.buffered.contains_key(&frame.index) {
            Step::Keep(transfer)
        } else if transfer.buffered.len() >= self.config.max_buffered_chunks {
            Step::Abort(transfer, "too many buffered chunks".into())
        } else {
            transfer.buffered.insert(frame.index, frame);
            Step::Keep(transfer)
        };

        self.settle(transfer_id, step).await
    }

    /// Handle an `end` message.
    pub async fn handle_end(
        &mut self,
        sender: &UserId,
        transfer_id: TransferId,
    ) -> Option<TransferOutcome> {
        let mut transfer = self.take_or_create(transfer_id, sender)?;
        transfer.ended = true;
        self.settle(transfer_id, Step::Keep(transfer)).await
    }

    /// Abandon every transfer from `sender` without finalizing.
    pub async fn abandon_sender(&mut self, sender: &UserId) -> Vec<TransferId> {
        let ids: Vec<TransferId> = self
            .transfers
            .iter()
            .filter(|(_, t)| &t.sender == sender)
            .map(|(id, _)| *id)
            .collect();

        for id in &ids {
            if let Some(transfer) = self.transfers.remove(id) {
                self.discard(*id, transfer).await;
            }
        }
        if !ids.is_empty() {
            tracing::info!(sender = %sender, count = ids.len(), "abandoned transfers");
        }
        ids
    }

    /// Abort every transfer idle for at least `idle_timeout`.
    pub async fn evict_idle(&mut self) -> Vec<TransferOutcome> {
        let timeout = self.config.idle_timeout;
        let ids: Vec<TransferId> = self
            .transfers
            .iter()
            .filter(|(_, t)| t.last_activity.elapsed() >= timeout)
            .map(|(id, _)| *id)
            .collect();

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(transfer) = self.transfers.remove(&id) {
                let step = Step::Abort(transfer, "idle timeout".into());
                outcomes.extend(self.settle(id, step).await);
            }
        }
        outcomes
    }

    /// Abandon everything, e.g. when the room changes.
    pub async fn clear(&mut self) {
        let transfers: Vec<_> = self.transfers.drain().collect();
        for (id, transfer) in transfers {
            self.discard(id, transfer).await;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// Remove a transfer from the map for processing, creating it if new.
    fn take_or_create(&mut self, id: TransferId, sender: &UserId) -> Option<Transfer> {
        if self.finished.contains(&id) {
            tracing::debug!(transfer = %id, "dropping message for finished transfer");
            return None;
        }
        if let Some(transfer) = self.transfers.remove(&id) {
            if &transfer.sender != sender {
                tracing::warn!(transfer = %id, sender = %sender, "dropping message from another peer");
                self.transfers.insert(id, transfer);
                return None;
            }
            let mut transfer = transfer;
            transfer.last_activity = Instant::now();
            return Some(transfer);
        }
        Some(Transfer::new(sender.clone()))
    }

    /// Put a transfer back, complete it, or abort it.
    async fn settle(&mut self, id: TransferId, step: Step) -> Option<TransferOutcome> {
        let (transfer, reason) = match step {
            Step::Keep(mut transfer) => {
                if transfer.is_complete() {
                    return self.complete(id, &mut transfer).await;
                }
                if self.transfers.len() < self.config.max_transfers {
                    self.transfers.insert(id, transfer);
                    return None;
                }
                (transfer, "too many concurrent transfers".to_string())
            }
            Step::Abort(transfer, reason) => (transfer, reason),
        };

        tracing::warn!(transfer = %id, reason = %reason, "transfer aborted");
        let sender = transfer.sender.clone();
        self.discard(id, transfer).await;
        Some(TransferOutcome::Failed {
            transfer_id: id,
            sender,
            reason,
        })
    }

    async fn complete(&mut self, id: TransferId, transfer: &mut Transfer) -> Option<TransferOutcome> {
        let sender = transfer.sender.clone();
        let sink = transfer.sink.take()?;
        self.remember_finished(id);
        match sink.finish().await {
            Ok(file) => {
                tracing::info!(transfer = %id, name = %file.name, bytes = file.len, "transfer complete");
                Some(TransferOutcome::Completed {
                    transfer_id: id,
                    sender,
                    file,
                })
            }
            Err(e) => {
                tracing::warn!(transfer = %id, error = %e, "failed to finish transfer");
                Some(TransferOutcome::Failed {
                    transfer_id: id,
                    sender,
                    reason: format!("finish: {}", e),
                })
            }
        }
    }

    async fn discard(&mut self, id: TransferId, transfer: Transfer) {
        if let Some(sink) = transfer.sink {
            sink.abort().await;
        }
        self.remember_finished(id);
    }

    fn remember_finished(&mut self, id: TransferId) {
        if self.finished.len() >= self.config.finished_history {
            self.finished.pop_front();
        }
        self.finished.push_back(id);
    }

    /// Open, decompress and append one in-order frame.
    async fn deliver(
        key: &RoomKey,
        max_chunk_len: usize,
        transfer: &mut Transfer,
        frame: &ChunkFrame,
    ) -> std::result::Result<(), String> {
        let compressed = frame
            .open(key)
            .map_err(|e| format!("chunk {}: {}", frame.index, e))?;
        let chunk = decompress(&compressed, max_chunk_len)
            .map_err(|e| format!("chunk {}: {}", frame.index, e))?;
        let sink = transfer
            .sink
            .as_mut()
            .ok_or_else(|| "no sink".to_string())?;
        sink.write_chunk(&chunk)
            .await
            .map_err(|e| format!("chunk {}: {}", frame.index, e))?;
        transfer.next_index += 1;
        Ok(())
    }

    /// Deliver buffered frames while they are contiguous.
    async fn drain(key: &RoomKey, max_chunk_len: usize, mut transfer: Transfer) -> Step {
        while let Some(frame) = transfer.buffered.remove(&transfer.next_index) {
            if let Err(reason) = Self::deliver(key, max_chunk_len, &mut transfer, &frame).await {
                return Step::Abort(transfer, reason);
            }
        }
        // Anything left below next_index can never be delivered.
        let next = transfer.next_index;
        transfer.buffered.retain(|index, _| *index > next);
        Step::Keep(transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySinkProvider;
    use cliplink_crypto::{compress, DEFAULT_COMPRESSION_LEVEL, KEY_SIZE};

    fn key() -> RoomKey {
        RoomKey::from_bytes([9; KEY_SIZE])
    }

    fn sender() -> UserId {
        UserId::from("a")
    }

    fn frames(id: TransferId, chunks: &[&[u8]]) -> Vec<Bytes> {
        let total = chunks.len() as u32;
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let packed = compress(chunk, DEFAULT_COMPRESSION_LEVEL).unwrap();
                ChunkFrame::seal(&key(), id, i as u32, total, &packed)
                    .unwrap()
                    .encode()
            })
            .collect()
    }

    fn name(text: &str) -> Envelope {
        Envelope::seal_str(text, &key()).unwrap()
    }

    fn reassembler() -> Reassembler<MemorySinkProvider> {
        Reassembler::new(MemorySinkProvider::new(), ReassemblyConfig::default())
    }

    #[tokio::test]
    async fn test_out_of_order_delivery() {
        let mut r = reassembler();
        let id = TransferId::random();
        let wire = frames(id, &[b"aa", b"bb", b"cc", b"dd"]);

        assert!(r.handle_start(&key(), &sender(), id, &name("x.bin"), 4).await.is_none());
        for i in [2, 0, 3, 1] {
            assert!(r.handle_frame(&key(), &sender(), &wire[i]).await.is_none());
        }
        let outcome = r.handle_end(&sender(), id).await.unwrap();

        match outcome {
            TransferOutcome::Completed { file, sender: from, .. } => {
                assert_eq!(file.name, "x.bin");
                assert_eq!(from, sender());
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(r.provider().finished().await[0].1, b"aabbccdd");
        assert_eq!(r.active(), 0);
    }

    #[tokio::test]
    async fn test_frames_before_start_are_buffered() {
        let mut r = reassembler();
        let id = TransferId::random();
        let wire = frames(id, &[b"one", b"two"]);

        r.handle_frame(&key(), &sender(), &wire[1]).await;
        r.handle_frame(&key(), &sender(), &wire[0]).await;
        r.handle_end(&sender(), id).await;
        assert!(r.is_tracking(&id));

        let outcome = r.handle_start(&key(), &sender(), id, &name("late.txt"), 2).await;
        assert!(matches!(outcome, Some(TransferOutcome::Completed { .. })));
        assert_eq!(r.provider().finished().await[0].1, b"onetwo");
    }

    #[tokio::test]
    async fn test_duplicate_frame_is_noop() {
        let mut r = reassembler();
        let id = TransferId::random();
        let wire = frames(id, &[b"x", b"y"]);

        r.handle_start(&key(), &sender(), id, &name("d"), 2).await;
        r.handle_frame(&key(), &sender(), &wire[0]).await;
        r.handle_frame(&key(), &sender(), &wire[0]).await;
        r.handle_frame(&key(), &sender(), &wire[1]).await;
        r.handle_end(&sender(), id).await;

        assert_eq!(r.provider().finished().await[0].1, b"xy");
    }

    #[tokio::test]
    async fn test_tampered_chunk_aborts() {
        let mut r = reassembler();
        let id = TransferId::random();
        let wire = frames(id, &[b"good", b"evil"]);
        let mut bad = wire[1].to_vec();
        let last = bad.len() - 1;
        bad[last] ^= 0x01;

        r.handle_start(&key(), &sender(), id, &name("t"), 2).await;
        r.handle_frame(&key(), &sender(), &wire[0]).await;
        let outcome = r.handle_frame(&key(), &sender(), &Bytes::from(bad)).await;

        assert!(matches!(outcome, Some(TransferOutcome::Failed { .. })));
        assert!(r.handle_end(&sender(), id).await.is_none());
        assert!(r.provider().finished().await.is_empty());
        assert_eq!(r.provider().aborted().await, 1);
        assert!(!r.is_tracking(&id));
    }

    #[tokio::test]
    async fn test_conflicting_total_aborts() {
        let mut r = reassembler();
        let id = TransferId::random();
        let wire = frames(id, &[b"one", b"two"]);
        // Byte 23 is the low byte of the chunk count.
        let mut bad = wire[1].to_vec();
        bad[23] ^= 0x01;

        r.handle_start(&key(), &sender(), id, &name("t"), 2).await;
        assert!(r.handle_frame(&key(), &sender(), &wire[0]).await.is_none());
        let outcome = r.handle_frame(&key(), &sender(), &Bytes::from(bad)).await;

        match outcome {
            Some(TransferOutcome::Failed { reason, .. }) => assert!(reason.contains("conflicting")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!r.is_tracking(&id));
        assert_eq!(r.active(), 0);
        assert_eq!(r.provider().aborted().await, 1);
        assert!(r.handle_end(&sender(), id).await.is_none());
    }

    #[tokio::test]
    async fn test_idle_transfer_evicted() {
        let mut r = Reassembler::new(
            MemorySinkProvider::new(),
            ReassemblyConfig {
                idle_timeout: Duration::from_millis(10),
                ..ReassemblyConfig::default()
            },
        );
        let stale = TransferId::random();
        let wire = frames(stale, &[b"one", b"two"]);
        r.handle_start(&key(), &sender(), stale, &name("stale"), 2).await;
        r.handle_frame(&key(), &sender(), &wire[0]).await;

        assert!(r.evict_idle().await.is_empty());
        tokio::time::sleep(Duration::from_millis(30)).await;

        let fresh = TransferId::random();
        r.handle_start(&key(), &sender(), fresh, &name("fresh"), 1).await;

        let outcomes = r.evict_idle().await;
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            TransferOutcome::Failed { transfer_id, reason, .. } => {
                assert_eq!(*transfer_id, stale);
                assert_eq!(reason, "idle timeout");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!r.is_tracking(&stale));
        assert!(r.is_tracking(&fresh));
        assert_eq!(r.provider().aborted().await, 1);
        // Late frames for the evicted transfer are not resurrected.
        assert!(r.handle_frame(&key(), &sender(), &wire[1]).await.is_none());
        assert!(!r.is_tracking(&stale));
    }

    #[tokio::test]
    async fn test_bad_file_name_aborts() {
        let mut r = reassembler();
        let id = TransferId::random();
        let foreign = Envelope::seal_str("x", &RoomKey::from_bytes([1; KEY_SIZE])).unwrap();

        let outcome = r.handle_start(&key(), &sender(), id, &foreign, 1).await;
        assert!(matches!(outcome, Some(TransferOutcome::Failed { .. })));
    }

    #[tokio::test]
    async fn test_out_of_range_index_dropped() {
        let mut r = reassembler();
        let id = TransferId::random();
        let wire = frames(id, &[b"a", b"b", b"c"]);
        let mut stray = ChunkFrame::decode(&wire[2]).unwrap();
        stray.index = 7;
        stray.total = 0;

        r.handle_start(&key(), &sender(), id, &name("r"), 2).await;
        assert!(r.handle_frame(&key(), &sender(), &stray.encode()).await.is_none());
        assert!(r.is_tracking(&id));
    }

    #[tokio::test]
    async fn test_end_without_total_waits() {
        let mut r = reassembler();
        let id = TransferId::random();
        let packed = compress(b"z", DEFAULT_COMPRESSION_LEVEL).unwrap();
        let frame = ChunkFrame::seal(&key(), id, 0, 0, &packed).unwrap().encode();

        r.handle_start(&key(), &sender(), id, &name("u"), 0).await;
        r.handle_frame(&key(), &sender(), &frame).await;
        assert!(r.handle_end(&sender(), id).await.is_none());
        assert!(r.is_tracking(&id));
    }

    #[tokio::test]
    async fn test_buffer_cap_aborts() {
        let config = ReassemblyConfig {
            max_buffered_chunks: 2,
            ..ReassemblyConfig::default()
        };
        let mut r = Reassembler::new(MemorySinkProvider::new(), config);
        let id = TransferId::random();
        let wire = frames(id, &[b"0", b"1", b"2", b"3", b"4"]);

        r.handle_frame(&key(), &sender(), &wire[1]).await;
        r.handle_frame(&key(), &sender(), &wire[2]).await;
        let outcome = r.handle_frame(&key(), &sender(), &wire[3]).await;
        assert!(matches!(outcome, Some(TransferOutcome::Failed { .. })));
    }

    #[tokio::test]
    async fn test_transfer_cap_aborts_newcomer() {
        let config = ReassemblyConfig {
            max_transfers: 1,
            ..ReassemblyConfig::default()
        };
        let mut r = Reassembler::new(MemorySinkProvider::new(), config);
        let first = TransferId::random();
        let second = TransferId::random();

        assert!(r.handle_end(&sender(), first).await.is_none());
        let outcome = r.handle_end(&sender(), second).await;
        assert!(matches!(outcome, Some(TransferOutcome::Failed { transfer_id, .. }) if transfer_id == second));
        assert!(r.is_tracking(&first));
    }

    #[tokio::test]
    async fn test_abandon_sender() {
        let mut r = reassembler();
        let id = TransferId::random();
        let wire = frames(id, &[b"p", b"q"]);

        r.handle_start(&key(), &sender(), id, &name("gone"), 2).await;
        r.handle_frame(&key(), &sender(), &wire[0]).await;

        assert_eq!(r.abandon_sender(&sender()).await, vec![id]);
        assert_eq!(r.active(), 0);
        assert_eq!(r.provider().aborted().await, 1);
        assert!(r.handle_frame(&key(), &sender(), &wire[1]).await.is_none());
        assert!(r.provider().finished().await.is_empty());
    }

    #[tokio::test]
    async fn test_other_sender_cannot_hijack() {
        let mut r = reassembler();
        let id = TransferId::random();
        r.handle_start(&key(), &sender(), id, &name("mine"), 1).await;

        assert!(r.handle_end(&UserId::from("mallory"), id).await.is_none());
        assert!(r.is_tracking(&id));
    }

    #[tokio::test]
    async fn test_redelivered_frame_after_completion_dropped() {
        let mut r = reassembler();
        let id = TransferId::random();
        let wire = frames(id, &[b"done"]);

        r.handle_start(&key(), &sender(), id, &name("once"), 1).await;
        r.handle_frame(&key(), &sender(), &wire[0]).await;
        let outcome = r.handle_end(&sender(), id).await;
        assert!(matches!(outcome, Some(TransferOutcome::Completed { .. })));

        assert!(r.handle_frame(&key(), &sender(), &wire[0]).await.is_none());
        assert!(!r.is_tracking(&id));
        assert_eq!(r.provider().finished().await.len(), 1);
    }
}
