//! Peer transport abstraction.
//!
//! The transport performs network I/O, NAT traversal and raw datagram
//! delivery for peer links. Cliplink only needs the handful of operations
//! below; callbacks come back as [`LinkEvent`]s on the channel supplied at
//! link creation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use cliplink_core::UserId;
use cliplink_relay::{IceCandidate, SessionDescription};

use crate::error::Result;

/// Controller-assigned identifier of one link instance.
///
/// A peer may be linked several times (after a replacement offer or a
/// relay reconnect); events from a superseded link carry its old id and are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// The two data channels of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLabel {
    /// Control messages (JSON).
    Control,
    /// Chunk frames (binary).
    File,
}

impl ChannelLabel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "universal-clipboard",
            Self::File => "file-transfer",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "universal-clipboard" => Some(Self::Control),
            "file-transfer" => Some(Self::File),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reliable data channel of a peer link.
#[async_trait]
pub trait DataChannel: Send + Sync + 'static {
    /// The label the channel was opened with.
    fn label(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Queue bytes for delivery.
    fn send(&self, data: Bytes) -> Result<()>;

    /// Bytes queued but not yet handed to the network.
    fn buffered_amount(&self) -> usize;

    /// Resolve once the buffered amount is below `threshold`.
    async fn wait_buffered_amount_low(&self, threshold: usize);
}

/// One negotiated connection to a remote peer.
#[async_trait]
pub trait PeerConnection: Send + Sync + 'static {
    type Channel: DataChannel;

    /// Open a locally initiated channel. It reports open once negotiated.
    async fn open_channel(&self, label: ChannelLabel) -> Result<Arc<Self::Channel>>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Requires a remote offer to have been applied.
    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Release the connection. Idempotent.
    async fn close(&self);
}

/// Factory for peer connections.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    type Connection: PeerConnection;

    /// Create a connection to `remote`. Every callback for it is sent to
    /// `events` tagged with `link`.
    async fn create_link(
        &self,
        link: LinkId,
        remote: &UserId,
        events: mpsc::UnboundedSender<LinkEvent<<Self::Connection as PeerConnection>::Channel>>,
    ) -> Result<Self::Connection>;
}

/// The channel type of a transport.
pub type ChannelOf<T> = <<T as PeerTransport>::Connection as PeerConnection>::Channel;

/// A transport callback for one link.
pub struct LinkEvent<C> {
    pub link: LinkId,
    pub remote: UserId,
    pub kind: LinkEventKind<C>,
}

pub enum LinkEventKind<C> {
    /// A connectivity candidate to forward to the remote.
    LocalCandidate(IceCandidate),
    /// The remote opened a channel towards us.
    InboundChannel(Arc<C>),
    ChannelOpen(ChannelLabel),
    Message { label: ChannelLabel, data: Bytes },
    ChannelClosed(ChannelLabel),
    Failed(String),
}

impl<C> fmt::Debug for LinkEvent<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            LinkEventKind::LocalCandidate(_) => "local-candidate",
            LinkEventKind::InboundChannel(_) => "inbound-channel",
            LinkEventKind::ChannelOpen(_) => "channel-open",
            LinkEventKind::Message { .. } => "message",
            LinkEventKind::ChannelClosed(_) => "channel-closed",
            LinkEventKind::Failed(_) => "failed",
        };
        f.debug_struct("LinkEvent")
            .field("link", &self.link)
            .field("remote", &self.remote)
            .field("kind", &kind)
            .finish()
    }
}

/// An in-process transport for tests.
///
/// Offers and answers are opaque `memory:<token>` strings; the channels are
/// wired together when the initiator applies the answer. Delivery is
/// immediate, so the buffered amount is always zero.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::OnceLock;
    use tokio::sync::Mutex;

    use cliplink_relay::SdpKind;

    use crate::error::SyncError;

    type Events = mpsc::UnboundedSender<LinkEvent<MemoryChannel>>;

    const SDP_PREFIX: &str = "memory:";

    /// Shared rendezvous point for memory connections.
    #[derive(Default)]
    pub struct MemoryPeerNetwork {
        next_token: AtomicU64,
        /// Offer token -> offering connection.
        offers: Mutex<HashMap<u64, Arc<Endpoint>>>,
        /// Offer token -> answering connection.
        answers: Mutex<HashMap<u64, Arc<Endpoint>>>,
    }

    impl MemoryPeerNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// A transport for the peer called `local`.
        pub fn transport(self: &Arc<Self>, local: UserId) -> MemoryTransport {
            MemoryTransport {
                local,
                network: Arc::clone(self),
            }
        }
    }

    pub struct MemoryTransport {
        local: UserId,
        network: Arc<MemoryPeerNetwork>,
    }

    #[async_trait]
    impl PeerTransport for MemoryTransport {
        type Connection = MemoryConnection;

        async fn create_link(
            &self,
            link: LinkId,
            remote: &UserId,
            events: Events,
        ) -> Result<MemoryConnection> {
            Ok(MemoryConnection {
                endpoint: Arc::new(Endpoint {
                    local: self.local.clone(),
                    remote: remote.clone(),
                    link,
                    events,
                    channels: Mutex::new(Vec::new()),
                    own_offer: Mutex::new(None),
                    remote_offer: Mutex::new(None),
                    closed: AtomicBool::new(false),
                }),
                network: Arc::clone(&self.network),
            })
        }
    }

    /// One side of a memory link.
    struct Endpoint {
        local: UserId,
        remote: UserId,
        link: LinkId,
        events: Events,
        channels: Mutex<Vec<Arc<MemoryChannel>>>,
        own_offer: Mutex<Option<u64>>,
        remote_offer: Mutex<Option<u64>>,
        closed: AtomicBool,
    }

    impl Endpoint {
        fn emit(&self, kind: LinkEventKind<MemoryChannel>) {
            let _ = self.events.send(LinkEvent {
                link: self.link,
                remote: self.remote.clone(),
                kind,
            });
        }

        fn candidate(&self, token: u64) {
            self.emit(LinkEventKind::LocalCandidate(IceCandidate {
                candidate: format!("candidate:{} 1 memory {} typ host", token, self.local),
                sdp_mid: Some("0".into()),
                sdp_m_line_index: Some(0),
            }));
        }
    }

    pub struct MemoryConnection {
        endpoint: Arc<Endpoint>,
        network: Arc<MemoryPeerNetwork>,
    }

    fn parse_token(description: &SessionDescription) -> Result<u64> {
        description
            .sdp
            .strip_prefix(SDP_PREFIX)
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| {
                SyncError::TransportError(format!("invalid description: {}", description.sdp))
            })
    }

    impl MemoryConnection {
        /// Wire the offerer's channels to the answerer.
        async fn connect(&self, answerer: Arc<Endpoint>) -> Result<()> {
            let offerer = &self.endpoint;
            let channels = offerer.channels.lock().await.clone();

            for local_end in channels {
                let remote_end = Arc::new(MemoryChannel::new(local_end.label));
                local_end.attach(PeerEnd {
                    events: answerer.events.clone(),
                    link: answerer.link,
                    from: offerer.local.clone(),
                });
                remote_end.attach(PeerEnd {
                    events: offerer.events.clone(),
                    link: offerer.link,
                    from: answerer.local.clone(),
                });
                answerer.channels.lock().await.push(Arc::clone(&remote_end));

                answerer.emit(LinkEventKind::InboundChannel(Arc::clone(&remote_end)));
                answerer.emit(LinkEventKind::ChannelOpen(remote_end.label));
                offerer.emit(LinkEventKind::ChannelOpen(local_end.label));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PeerConnection for MemoryConnection {
        type Channel = MemoryChannel;

        async fn open_channel(&self, label: ChannelLabel) -> Result<Arc<MemoryChannel>> {
            let channel = Arc::new(MemoryChannel::new(label));
            self.endpoint.channels.lock().await.push(Arc::clone(&channel));
            Ok(channel)
        }

        async fn create_offer(&self) -> Result<SessionDescription> {
            let token = self.network.next_token.fetch_add(1, Ordering::Relaxed) + 1;
            *self.endpoint.own_offer.lock().await = Some(token);
            self.network
                .offers
                .lock()
                .await
                .insert(token, Arc::clone(&self.endpoint));
            self.endpoint.candidate(token);
            Ok(SessionDescription::offer(format!("{}{}", SDP_PREFIX, token)))
        }

        async fn create_answer(&self) -> Result<SessionDescription> {
            let token = (*self.endpoint.remote_offer.lock().await)
                .ok_or_else(|| SyncError::TransportError("no remote offer".into()))?;
            self.network
                .answers
                .lock()
                .await
                .insert(token, Arc::clone(&self.endpoint));
            self.endpoint.candidate(token);
            Ok(SessionDescription::answer(format!("{}{}", SDP_PREFIX, token)))
        }

        async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
            let token = parse_token(&description)?;
            match description.kind {
                SdpKind::Offer => {
                    if !self.network.offers.lock().await.contains_key(&token) {
                        return Err(SyncError::TransportError(format!("unknown offer {}", token)));
                    }
                    *self.endpoint.remote_offer.lock().await = Some(token);
                    Ok(())
                }
                SdpKind::Answer => {
                    if *self.endpoint.own_offer.lock().await != Some(token) {
                        return Err(SyncError::TransportError("answer for another offer".into()));
                    }
                    let answerer = self
                        .network
                        .answers
                        .lock()
                        .await
                        .remove(&token)
                        .ok_or_else(|| SyncError::TransportError(format!("no answer for {}", token)))?;
                    self.network.offers.lock().await.remove(&token);
                    self.connect(answerer).await
                }
            }
        }

        async fn add_candidate(&self, candidate: IceCandidate) -> Result<()> {
            if !candidate.candidate.starts_with("candidate:") {
                return Err(SyncError::TransportError(format!(
                    "invalid candidate: {}",
                    candidate.candidate
                )));
            }
            Ok(())
        }

        async fn close(&self) {
            if self.endpoint.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            for channel in self.endpoint.channels.lock().await.drain(..) {
                channel.close();
            }
            if let Some(token) = *self.endpoint.own_offer.lock().await {
                self.network.offers.lock().await.remove(&token);
                self.network.answers.lock().await.remove(&token);
            }
        }
    }

    struct PeerEnd {
        events: Events,
        link: LinkId,
        from: UserId,
    }

    /// One end of an in-memory channel pair.
    pub struct MemoryChannel {
        label: ChannelLabel,
        open: AtomicBool,
        peer: OnceLock<PeerEnd>,
    }

    impl MemoryChannel {
        fn new(label: ChannelLabel) -> Self {
            Self {
                label,
                open: AtomicBool::new(false),
                peer: OnceLock::new(),
            }
        }

        fn attach(&self, peer: PeerEnd) {
            if self.peer.set(peer).is_ok() {
                self.open.store(true, Ordering::SeqCst);
            }
        }

        /// Close this end and tell the other side.
        fn close(&self) {
            if !self.open.swap(false, Ordering::SeqCst) {
                return;
            }
            if let Some(peer) = self.peer.get() {
                let _ = peer.events.send(LinkEvent {
                    link: peer.link,
                    remote: peer.from.clone(),
                    kind: LinkEventKind::ChannelClosed(self.label),
                });
            }
        }
    }

    #[async_trait]
    impl DataChannel for MemoryChannel {
        fn label(&self) -> &str {
            self.label.as_str()
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn send(&self, data: Bytes) -> Result<()> {
            let peer = match self.peer.get() {
                Some(peer) if self.is_open() => peer,
                _ => return Err(SyncError::ChannelClosed(self.label.to_string())),
            };
            peer.events
                .send(LinkEvent {
                    link: peer.link,
                    remote: peer.from.clone(),
                    kind: LinkEventKind::Message {
                        label: self.label,
                        data,
                    },
                })
                .map_err(|_| SyncError::ChannelClosed(self.label.to_string()))
        }

        fn buffered_amount(&self) -> usize {
            0
        }

        async fn wait_buffered_amount_low(&self, _threshold: usize) {}
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryPeerNetwork;
    use super::*;

    fn drain<C>(rx: &mut mpsc::UnboundedReceiver<LinkEvent<C>>) -> Vec<LinkEvent<C>> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_memory_negotiation_and_delivery() {
        let network = MemoryPeerNetwork::new();
        let transport_a = network.transport(UserId::from("a"));
        let transport_b = network.transport(UserId::from("b"));

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        let conn_a = transport_a.create_link(LinkId(1), &UserId::from("b"), tx_a).await.unwrap();
        let conn_b = transport_b.create_link(LinkId(7), &UserId::from("a"), tx_b).await.unwrap();

        let control_a = conn_a.open_channel(ChannelLabel::Control).await.unwrap();
        assert!(!control_a.is_open());

        let offer = conn_a.create_offer().await.unwrap();
        conn_b.set_remote_description(offer).await.unwrap();
        let answer = conn_b.create_answer().await.unwrap();
        conn_a.set_remote_description(answer).await.unwrap();
        assert!(control_a.is_open());

        let events_b = drain(&mut rx_b);
        let inbound = events_b
            .into_iter()
            .find_map(|e| match e.kind {
                LinkEventKind::InboundChannel(ch) => Some((e.link, e.remote, ch)),
                _ => None,
            })
            .unwrap();
        assert_eq!(inbound.0, LinkId(7));
        assert_eq!(inbound.1, UserId::from("a"));
        assert_eq!(inbound.2.label(), "universal-clipboard");

        control_a.send(Bytes::from_static(b"ping")).unwrap();
        let delivered = drain(&mut rx_b);
        assert!(matches!(
            &delivered[0].kind,
            LinkEventKind::Message { label: ChannelLabel::Control, data } if &data[..] == b"ping"
        ));

        inbound.2.send(Bytes::from_static(b"pong")).unwrap();
        let back: Vec<_> = drain(&mut rx_a)
            .into_iter()
            .filter(|e| matches!(e.kind, LinkEventKind::Message { .. }))
            .collect();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].link, LinkId(1));
        assert_eq!(back[0].remote, UserId::from("b"));
    }

    #[tokio::test]
    async fn test_close_notifies_remote() {
        let network = MemoryPeerNetwork::new();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let conn_a = network
            .transport(UserId::from("a"))
            .create_link(LinkId(1), &UserId::from("b"), tx_a)
            .await
            .unwrap();
        let conn_b = network
            .transport(UserId::from("b"))
            .create_link(LinkId(2), &UserId::from("a"), tx_b)
            .await
            .unwrap();

        let file_a = conn_a.open_channel(ChannelLabel::File).await.unwrap();
        conn_b.set_remote_description(conn_a.create_offer().await.unwrap()).await.unwrap();
        conn_a.set_remote_description(conn_b.create_answer().await.unwrap()).await.unwrap();
        drain(&mut rx_b);

        conn_a.close().await;
        assert!(!file_a.is_open());
        assert!(file_a.send(Bytes::new()).is_err());
        let closed = drain(&mut rx_b);
        assert!(matches!(closed[0].kind, LinkEventKind::ChannelClosed(ChannelLabel::File)));
    }

    #[tokio::test]
    async fn test_invalid_descriptions_rejected() {
        let network = MemoryPeerNetwork::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = network
            .transport(UserId::from("a"))
            .create_link(LinkId(1), &UserId::from("b"), tx)
            .await
            .unwrap();

        assert!(conn.create_answer().await.is_err());
        assert!(conn
            .set_remote_description(SessionDescription::offer("v=0 garbage"))
            .await
            .is_err());
        assert!(conn
            .set_remote_description(SessionDescription::answer("memory:99"))
            .await
            .is_err());
        assert!(conn.add_candidate(IceCandidate::new("bogus")).await.is_err());
        assert!(conn.add_candidate(IceCandidate::new("candidate:1 1 udp")).await.is_ok());
    }

    #[test]
    fn test_channel_labels() {
        assert_eq!(ChannelLabel::from_label("universal-clipboard"), Some(ChannelLabel::Control));
        assert_eq!(ChannelLabel::from_label("file-transfer"), Some(ChannelLabel::File));
        assert_eq!(ChannelLabel::from_label("chat"), None);
    }
}
