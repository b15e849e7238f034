//! The clipboard sync controller.
//!
//! The controller owns the peer table, the reassembler and the history, and
//! handles one event at a time: a relay message, a link event or a poll
//! tick. Poll ticks also evict stalled inbound transfers. Outbound transfers run on their own tasks holding only channel
//! handles and the room key.

use std::collections::HashMap;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use cliplink_core::{now_millis, ClipboardKind, History, HistoryEntry, Origin, RoomId, UserId};
use cliplink_crypto::{derive_room_key, Envelope, RoomKey};
use cliplink_relay::{Join, LegacyClipboard, RendezvousMessage, SignalMessage, SignalPayload};
use cliplink_sync::{
    spawn_signaling, ChannelLabel, ChannelOf, ClipboardMessage, ControlMessage, DataChannel,
    FileTransferMessage, LinkEvent, LinkEventKind, LinkId, LinkState, PeerLink, PeerTransport,
    Reassembler, SignalingEvent, SignalingHandle, SinkProvider, SyncError, TransferOutcome,
    TransferSender,
};

use crate::clipboard::{classify, Classified, ClipboardAccess};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// One unit of work for the controller.
pub enum ControllerEvent<C> {
    Signaling(SignalingEvent),
    Link(LinkEvent<C>),
    Poll,
}

/// Keeps the local clipboard in sync with every peer in a room.
pub struct SyncController<T, P, C>
where
    T: PeerTransport,
    P: SinkProvider,
    C: ClipboardAccess,
{
    config: ClientConfig,
    transport: T,
    clipboard: C,
    signaling: SignalingHandle,
    signaling_events: mpsc::UnboundedReceiver<SignalingEvent>,
    relay_connected: bool,
    peers: HashMap<UserId, PeerLink<T::Connection>>,
    next_link: u64,
    link_tx: mpsc::UnboundedSender<LinkEvent<ChannelOf<T>>>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent<ChannelOf<T>>>,
    reassembler: Reassembler<P>,
    history: History,
    last_clip: Option<String>,
    room: Option<RoomId>,
    key: Option<RoomKey>,
    poll: Option<Interval>,
}

impl<T, P, C> SyncController<T, P, C>
where
    T: PeerTransport,
    P: SinkProvider,
    C: ClipboardAccess,
{
    /// Create a controller around an existing signaling client.
    pub fn new(
        config: ClientConfig,
        transport: T,
        sinks: P,
        clipboard: C,
        signaling: SignalingHandle,
        signaling_events: mpsc::UnboundedReceiver<SignalingEvent>,
    ) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let reassembler = Reassembler::new(sinks, config.reassembly.clone());
        Self {
            config,
            transport,
            clipboard,
            signaling,
            signaling_events,
            relay_connected: false,
            peers: HashMap::new(),
            next_link: 0,
            link_tx,
            link_rx,
            reassembler,
            history: History::default(),
            last_clip: None,
            room: None,
            key: None,
            poll: None,
        }
    }

    /// Spawn a signaling client for `config.signaling` and wrap it.
    pub fn connect(config: ClientConfig, transport: T, sinks: P, clipboard: C) -> (Self, JoinHandle<()>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (handle, task) = spawn_signaling(config.signaling.clone(), events_tx);
        (
            Self::new(config, transport, sinks, clipboard, handle, events_rx),
            task,
        )
    }

    pub fn user_id(&self) -> &UserId {
        &self.config.user_id
    }

    /// Whether a relay session is currently established.
    pub fn is_relay_connected(&self) -> bool {
        self.relay_connected
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// State of the link to `peer`, if one exists.
    pub fn link_state(&self, peer: &UserId) -> Option<LinkState> {
        self.peers.get(peer).map(|link| link.state())
    }

    /// Peers whose link is connected.
    pub fn connected_peers(&self) -> Vec<UserId> {
        let mut peers: Vec<_> = self
            .peers
            .values()
            .filter(|link| link.is_connected())
            .map(|link| link.remote().clone())
            .collect();
        peers.sort();
        peers
    }

    /// Inbound transfers still in flight.
    pub fn active_transfers(&self) -> usize {
        self.reassembler.active()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Process events until the signaling client stops.
    pub async fn run(mut self) {
        while let Some(event) = self.next_event().await {
            self.handle(event).await;
        }
        self.close_all_links().await;
        tracing::info!("controller stopped");
    }

    /// Wait for the next event. `None` once the signaling client is gone.
    pub async fn next_event(&mut self) -> Option<ControllerEvent<ChannelOf<T>>> {
        let period = self.config.poll_interval;
        let poll = self.poll.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        tokio::select! {
            event = self.signaling_events.recv() => event.map(ControllerEvent::Signaling),
            Some(event) = self.link_rx.recv() => Some(ControllerEvent::Link(event)),
            _ = poll.tick() => Some(ControllerEvent::Poll),
        }
    }

    /// Handle one event to completion.
    pub async fn handle(&mut self, event: ControllerEvent<ChannelOf<T>>) {
        match event {
            ControllerEvent::Signaling(event) => self.handle_signaling(event).await,
            ControllerEvent::Link(event) => self.handle_link_event(event).await,
            ControllerEvent::Poll => {
                if let Err(e) = self.poll_clipboard().await {
                    tracing::warn!(error = %e, "clipboard poll failed");
                }
                for outcome in self.reassembler.evict_idle().await {
                    self.record_outcome(Some(outcome));
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rooms
    // ─────────────────────────────────────────────────────────────────────────

    /// Derive the room key, drop every link and join `room`.
    ///
    /// Without a relay session the join is sent once one is established.
    pub async fn join_room(&mut self, room: RoomId) -> Result<()> {
        let kdf = self.config.kdf.clone();
        let key_room = room.clone();
        let key = tokio::task::spawn_blocking(move || derive_room_key(&key_room, &kdf))
            .await
            .map_err(|e| ClientError::KeyTask(e.to_string()))??;

        self.close_all_links().await;
        self.reassembler.clear().await;
        if self.room.as_ref() != Some(&room) {
            self.history.clear();
            self.last_clip = None;
        }

        tracing::info!(room = %room, user = %self.config.user_id, "joining room");
        self.key = Some(key);
        self.room = Some(room);
        self.send_join()
    }

    fn send_join(&self) -> Result<()> {
        let Some(room) = self.room.as_ref().filter(|_| self.relay_connected) else {
            return Ok(());
        };
        self.signaling.send(RendezvousMessage::Join(Join {
            room_id: room.clone(),
            user_id: self.config.user_id.clone(),
            os: self.config.os.clone(),
        }))?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Relay messages
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn handle_signaling(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Connected => {
                // A new relay session invalidates every negotiated link.
                self.relay_connected = true;
                self.close_all_links().await;
                self.reassembler.clear().await;
                if let Err(e) = self.send_join() {
                    tracing::warn!(error = %e, "failed to re-join");
                }
            }
            SignalingEvent::Disconnected => {
                self.relay_connected = false;
                tracing::warn!("relay connection lost");
            }
            SignalingEvent::Message(message) => self.handle_rendezvous(message).await,
        }
    }

    async fn handle_rendezvous(&mut self, message: RendezvousMessage) {
        tracing::trace!(kind = message.kind(), "relay message");
        match message {
            RendezvousMessage::ExistingPeers(existing) => {
                for peer in existing.peers {
                    if peer.user_id != self.config.user_id {
                        self.initiate_link(peer.user_id).await;
                    }
                }
            }
            RendezvousMessage::PeerJoined(peer) => {
                // The newcomer sends the offer.
                tracing::info!(peer = %peer.user_id, os = %peer.os, "peer joined");
            }
            RendezvousMessage::PeerLeft(left) => {
                tracing::info!(peer = %left.user_id, "peer left");
                self.drop_peer(&left.user_id).await;
            }
            RendezvousMessage::Signal(signal) => self.handle_signal(signal).await,
            RendezvousMessage::Clipboard(legacy) => self.handle_legacy_clipboard(legacy).await,
            RendezvousMessage::Join(_) => {
                tracing::warn!("ignoring join sent by relay");
            }
        }
    }

    async fn handle_signal(&mut self, signal: SignalMessage) {
        let Some(sender) = signal.sender_id.clone() else {
            tracing::warn!("dropping signal without sender");
            return;
        };
        if signal.target.as_ref().is_some_and(|t| t != &self.config.user_id) {
            return;
        }
        let payload = match signal.payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(peer = %sender, error = %e, "dropping malformed signal");
                return;
            }
        };

        let result = match payload {
            SignalPayload::Offer(offer) => self.accept_offer(&sender, offer).await,
            SignalPayload::Answer(answer) => match self.peers.get_mut(&sender) {
                Some(link) => link.on_answer(answer).await,
                None => Err(SyncError::InvalidState("answer from unknown peer".into())),
            },
            SignalPayload::Candidate(candidate) => match self.peers.get_mut(&sender) {
                Some(link) => link.on_remote_candidate(candidate).await,
                None => {
                    tracing::debug!(peer = %sender, "candidate for unknown peer");
                    Ok(())
                }
            },
        };

        if let Err(e) = result {
            tracing::warn!(peer = %sender, error = %e, "negotiation failed; abandoning link");
            self.drop_peer(&sender).await;
        }
    }

    async fn handle_legacy_clipboard(&mut self, legacy: LegacyClipboard) {
        if legacy.clipboard_type != "text" {
            tracing::debug!(kind = %legacy.clipboard_type, "ignoring relayed non-text clipboard");
            return;
        }
        let (Some(sender), Some(key)) = (legacy.sender_id, self.key.clone()) else {
            return;
        };
        let text = serde_json::from_value::<Envelope>(legacy.content)
            .map_err(|e| e.to_string())
            .and_then(|envelope| envelope.open_string(&key).map_err(|e| e.to_string()));
        match text {
            Ok(text) => self.apply_remote_text(&sender, text).await,
            Err(e) => tracing::warn!(peer = %sender, error = %e, "dropping relayed clipboard"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Links
    // ─────────────────────────────────────────────────────────────────────────

    async fn new_link(&mut self, remote: &UserId) -> std::result::Result<PeerLink<T::Connection>, SyncError> {
        self.next_link += 1;
        let id = LinkId(self.next_link);
        let connection = self
            .transport
            .create_link(id, remote, self.link_tx.clone())
            .await?;
        Ok(PeerLink::new(id, remote.clone(), connection))
    }

    async fn initiate_link(&mut self, remote: UserId) {
        let mut link = match self.new_link(&remote).await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(peer = %remote, error = %e, "failed to create link");
                return;
            }
        };
        match link.initiate().await {
            Ok(offer) => {
                self.replace_link(remote.clone(), link).await;
                self.send_signal(&remote, SignalPayload::Offer(offer));
            }
            Err(e) => {
                tracing::warn!(peer = %remote, error = %e, "failed to create offer");
                link.close().await;
            }
        }
    }

    async fn accept_offer(
        &mut self,
        remote: &UserId,
        offer: cliplink_relay::SessionDescription,
    ) -> std::result::Result<(), SyncError> {
        let mut link = self.new_link(remote).await?;
        match link.respond(offer).await {
            Ok(answer) => {
                self.replace_link(remote.clone(), link).await;
                self.send_signal(remote, SignalPayload::Answer(answer));
                Ok(())
            }
            Err(e) => {
                link.close().await;
                Err(e)
            }
        }
    }

    async fn replace_link(&mut self, remote: UserId, link: PeerLink<T::Connection>) {
        if let Some(mut old) = self.peers.insert(remote, link) {
            tracing::debug!(peer = %old.remote(), link = %old.id(), "replacing link");
            old.close().await;
        }
    }

    fn send_signal(&self, target: &UserId, payload: SignalPayload) {
        let message = RendezvousMessage::Signal(SignalMessage::to(target.clone(), payload));
        if let Err(e) = self.signaling.send(message) {
            tracing::warn!(peer = %target, error = %e, "failed to queue signal");
        }
    }

    /// Close the link to `peer` and abandon its inbound transfers.
    async fn drop_peer(&mut self, peer: &UserId) {
        if let Some(mut link) = self.peers.remove(peer) {
            link.close().await;
        }
        self.reassembler.abandon_sender(peer).await;
    }

    async fn close_all_links(&mut self) {
        for (_, mut link) in self.peers.drain() {
            link.close().await;
        }
    }

    pub async fn handle_link_event(&mut self, event: LinkEvent<ChannelOf<T>>) {
        let LinkEvent { link, remote, kind } = event;
        let Some(current) = self.peers.get_mut(&remote).filter(|l| l.id() == link) else {
            tracing::trace!(peer = %remote, link = %link, "ignoring event for stale link");
            return;
        };

        match kind {
            LinkEventKind::LocalCandidate(candidate) => {
                self.send_signal(&remote, SignalPayload::Candidate(candidate));
            }
            LinkEventKind::InboundChannel(channel) => {
                if let Err(e) = current.on_inbound_channel(channel) {
                    tracing::warn!(peer = %remote, error = %e, "rejecting inbound channel");
                }
            }
            LinkEventKind::ChannelOpen(label) => {
                current.on_channel_open(label);
            }
            LinkEventKind::Message {
                label: ChannelLabel::Control,
                data,
            } => self.handle_control(&remote, &data).await,
            LinkEventKind::Message {
                label: ChannelLabel::File,
                data,
            } => self.handle_frame(&remote, &data).await,
            LinkEventKind::ChannelClosed(label) => {
                tracing::info!(peer = %remote, channel = %label, "channel closed");
                self.drop_peer(&remote).await;
            }
            LinkEventKind::Failed(reason) => {
                tracing::warn!(peer = %remote, reason = %reason, "link failed");
                self.drop_peer(&remote).await;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound data
    // ─────────────────────────────────────────────────────────────────────────

    async fn handle_control(&mut self, remote: &UserId, data: &[u8]) {
        let message = match ControlMessage::decode(data) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(peer = %remote, error = %e, "dropping control message");
                return;
            }
        };
        let Some(key) = self.key.clone() else {
            tracing::warn!(peer = %remote, "control message before joining a room");
            return;
        };

        match message {
            ControlMessage::Clipboard(message) => self.apply_clipboard(remote, message, &key).await,
            ControlMessage::FileTransfer(FileTransferMessage::Start {
                transfer_id,
                file_name,
                total_chunks,
                ..
            }) => {
                let outcome = self
                    .reassembler
                    .handle_start(&key, remote, transfer_id, &file_name, total_chunks)
                    .await;
                self.record_outcome(outcome);
            }
            ControlMessage::FileTransfer(FileTransferMessage::End { transfer_id, .. }) => {
                let outcome = self.reassembler.handle_end(remote, transfer_id).await;
                self.record_outcome(outcome);
            }
        }
    }

    async fn handle_frame(&mut self, remote: &UserId, data: &Bytes) {
        let Some(key) = self.key.as_ref() else {
            tracing::warn!(peer = %remote, "frame before joining a room");
            return;
        };
        let outcome = self.reassembler.handle_frame(key, remote, data).await;
        self.record_outcome(outcome);
    }

    fn record_outcome(&mut self, outcome: Option<TransferOutcome>) {
        match outcome {
            Some(TransferOutcome::Completed {
                transfer_id,
                sender,
                file,
            }) => {
                tracing::info!(transfer = %transfer_id, peer = %sender, name = %file.name, bytes = file.len, "file received");
                self.history.push(HistoryEntry::received_file(&file.name, sender));
            }
            Some(TransferOutcome::Failed {
                transfer_id,
                sender,
                reason,
            }) => {
                tracing::warn!(transfer = %transfer_id, peer = %sender, reason = %reason, "transfer failed");
            }
            None => {}
        }
    }

    async fn apply_clipboard(&mut self, remote: &UserId, message: ClipboardMessage, key: &RoomKey) {
        if message.clipboard_type == ClipboardKind::Text {
            match message.content.open_string(key) {
                Ok(text) => self.apply_remote_text(remote, text).await,
                Err(e) => tracing::warn!(peer = %remote, error = %e, "dropping clipboard text"),
            }
            return;
        }

        if let Err(e) = self.save_inline_file(remote, &message, key).await {
            tracing::warn!(peer = %remote, error = %e, "dropping inline file");
        }
    }

    async fn apply_remote_text(&mut self, remote: &UserId, text: String) {
        if self.last_clip.as_deref() == Some(text.as_str()) {
            return;
        }
        if let Err(e) = self.clipboard.write_text(&text).await {
            tracing::warn!(error = %e, "failed to write clipboard");
            return;
        }
        tracing::info!(peer = %remote, len = text.len(), "clipboard updated");
        self.last_clip = Some(text.clone());
        self.history.push(HistoryEntry::received_text(text, remote.clone()));
    }

    /// Write a file that arrived whole in a clipboard message.
    async fn save_inline_file(&mut self, remote: &UserId, message: &ClipboardMessage, key: &RoomKey) -> Result<()> {
        let data = message.content.open(key)?;
        let name = match &message.file_name {
            Some(name) => name.open_string(key)?,
            None => format!("file-{}", now_millis()),
        };

        let provider = self.reassembler.provider();
        let mut sink = provider.create(&name).await?;
        if let Err(e) = sink.write_chunk(&data).await {
            sink.abort().await;
            return Err(e.into());
        }
        let file = sink.finish().await?;

        tracing::info!(peer = %remote, name = %file.name, bytes = file.len, "inline file saved");
        self.history.push(HistoryEntry {
            kind: message.clipboard_type,
            content: format!("File: {}", file.name),
            origin: Origin::Remote(remote.clone()),
            timestamp: now_millis(),
        });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Outbound data
    // ─────────────────────────────────────────────────────────────────────────

    /// Read the clipboard once and send anything new to every connected peer.
    pub async fn poll_clipboard(&mut self) -> Result<()> {
        let Some(text) = self.clipboard.read_text().await? else {
            return Ok(());
        };
        if text.is_empty() || self.last_clip.as_deref() == Some(text.as_str()) {
            return Ok(());
        }
        self.last_clip = Some(text.clone());

        match classify(&text).await {
            Classified::Text(text) => {
                self.broadcast_text(&text)?;
                self.history.push(HistoryEntry::local_text(text));
            }
            Classified::File { path, kind } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.broadcast_file(path);
                self.history.push(HistoryEntry::local_file(kind, &name));
            }
        }
        Ok(())
    }

    fn broadcast_text(&self, text: &str) -> Result<()> {
        let Some(key) = &self.key else {
            return Ok(());
        };
        let message = ControlMessage::Clipboard(ClipboardMessage {
            clipboard_type: ClipboardKind::Text,
            content: Envelope::seal_str(text, key)?,
            file_name: None,
            sender_id: self.config.user_id.clone(),
            timestamp: now_millis(),
        });
        let payload = Bytes::from(message.encode()?);

        for link in self.peers.values() {
            let Some(channel) = link.control_channel() else {
                continue;
            };
            if let Err(e) = channel.send(payload.clone()) {
                tracing::warn!(peer = %link.remote(), error = %e, "failed to send clipboard");
            }
        }
        Ok(())
    }

    /// Start one transfer task per connected peer.
    fn broadcast_file(&self, path: PathBuf) {
        let Some(key) = &self.key else {
            return;
        };
        for link in self.peers.values() {
            let (Some(control), Some(file)) = (link.control_channel(), link.file_channel()) else {
                continue;
            };
            let sender = TransferSender::new(
                control,
                file,
                key.clone(),
                self.config.user_id.clone(),
                self.config.transfer.clone(),
            );
            let remote = link.remote().clone();
            let path = path.clone();
            tokio::spawn(async move {
                match sender.send_file(&path).await {
                    Ok(report) => {
                        tracing::info!(peer = %remote, transfer = %report.transfer_id, chunks = report.total_chunks, "file sent")
                    }
                    Err(e) => tracing::warn!(peer = %remote, error = %e, "file transfer failed"),
                }
            });
        }
    }
}
