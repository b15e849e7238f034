//! End-to-end scenarios: an in-process relay, real signaling clients and
//! the in-memory peer transport.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cliplink::core::{ClipboardKind, Origin, RoomId, UserId};
use cliplink::crypto::KdfConfig;
use cliplink::relay::{RelayConfig, RelayServer};
use cliplink::sync::{
    LinkState, MemoryPeerNetwork, MemorySinkProvider, MemoryTransport, Role, SignalingConfig,
    TransferConfig,
};
use cliplink::{ClientConfig, MemoryClipboard, SyncController};

const WAIT: Duration = Duration::from_secs(10);

type Controller = SyncController<MemoryTransport, MemorySinkProvider, MemoryClipboard>;

struct Node {
    controller: Controller,
    clipboard: MemoryClipboard,
    sinks: MemorySinkProvider,
}

/// Log to the test harness; `RUST_LOG` selects the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn start_relay() -> SocketAddr {
    init_tracing();
    let server = RelayServer::bind(RelayConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..RelayConfig::default()
    })
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());
    addr
}

async fn node(relay: SocketAddr, network: &Arc<MemoryPeerNetwork>, user: &str) -> Node {
    let config = ClientConfig {
        user_id: UserId::from(user),
        signaling: SignalingConfig {
            url: format!("ws://{}", relay),
            reconnect_delay: Duration::from_millis(50),
        },
        poll_interval: Duration::from_millis(20),
        kdf: KdfConfig::light(),
        transfer: TransferConfig {
            chunk_size: 16 * 1024,
            ..TransferConfig::default()
        },
        ..ClientConfig::default()
    };
    let clipboard = MemoryClipboard::new();
    let sinks = MemorySinkProvider::new();
    let (mut controller, _task) = SyncController::connect(
        config,
        network.transport(UserId::from(user)),
        sinks.clone(),
        clipboard.clone(),
    );
    controller
        .join_room(RoomId::new("abc123").unwrap())
        .await
        .unwrap();
    Node {
        controller,
        clipboard,
        sinks,
    }
}

/// Run one node until `done` holds.
async fn drive_one(node: &mut Node, done: impl Fn(&Node) -> bool) {
    tokio::time::timeout(WAIT, async {
        while !done(node) {
            match node.controller.next_event().await {
                Some(event) => node.controller.handle(event).await,
                None => panic!("signaling stopped"),
            }
        }
    })
    .await
    .expect("condition not reached");
}

/// Run two nodes concurrently until `done` holds.
async fn drive(a: &mut Node, b: &mut Node, done: impl Fn(&Node, &Node) -> bool) {
    tokio::time::timeout(WAIT, async {
        while !done(a, b) {
            tokio::select! {
                Some(event) = a.controller.next_event() => a.controller.handle(event).await,
                Some(event) = b.controller.next_event() => b.controller.handle(event).await,
                else => panic!("signaling stopped"),
            }
        }
    })
    .await
    .expect("condition not reached");
}

fn linked(a: &Node, b: &Node) -> bool {
    !a.controller.connected_peers().is_empty() && !b.controller.connected_peers().is_empty()
}

#[tokio::test]
async fn test_text_sync_between_two_peers() {
    let relay = start_relay().await;
    let network = MemoryPeerNetwork::new();
    let mut a = node(relay, &network, "a").await;
    let mut b = node(relay, &network, "b").await;

    drive(&mut a, &mut b, linked).await;

    a.clipboard.set("hello from a");
    drive(&mut a, &mut b, |_, b| {
        b.clipboard.get().as_deref() == Some("hello from a")
    })
    .await;

    let entry = b.controller.history().latest().unwrap();
    assert_eq!(entry.kind, ClipboardKind::Text);
    assert_eq!(entry.origin, Origin::Remote(UserId::from("a")));
    assert_eq!(a.controller.history().latest().unwrap().origin, Origin::Local);
}

#[tokio::test]
async fn test_file_transfer_between_two_peers() {
    let relay = start_relay().await;
    let network = MemoryPeerNetwork::new();
    let mut a = node(relay, &network, "a").await;
    let mut b = node(relay, &network, "b").await;

    drive(&mut a, &mut b, linked).await;

    // Three 16 KiB chunks.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.pdf");
    let content: Vec<u8> = (0..40 * 1024u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &content).unwrap();

    a.clipboard.set(path.to_str().unwrap());
    drive(&mut a, &mut b, |_, b| {
        b.controller
            .history()
            .latest()
            .is_some_and(|e| e.content == "File received: report.pdf")
    })
    .await;

    let finished = b.sinks.finished().await;
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].0.name, "report.pdf");
    assert_eq!(finished[0].1, content);
    assert_eq!(b.controller.active_transfers(), 0);

    let sent = a.controller.history().latest().unwrap();
    assert_eq!(sent.content, "File: report.pdf");
    assert_eq!(sent.kind, ClipboardKind::File);

    // The path itself is never pasted on the receiver.
    assert!(b.clipboard.writes().is_empty());
}

#[tokio::test]
async fn test_peer_leaving_mid_negotiation_leaves_no_link() {
    let relay = start_relay().await;
    let network = MemoryPeerNetwork::new();
    let mut a = node(relay, &network, "a").await;

    // a must be in the room before b arrives.
    drive_one(&mut a, |a| a.controller.is_relay_connected()).await;

    let mut b = node(relay, &network, "b").await;
    let peer_a = UserId::from("a");
    drive_one(&mut b, |b| {
        b.controller.link_state(&peer_a) == Some(LinkState::Negotiating(Role::Initiator))
    })
    .await;

    // b goes away with its offer in flight; the relay then reports peer-left.
    drop(b);

    let peer_b = UserId::from("b");
    drive_one(&mut a, |a| a.controller.link_state(&peer_b).is_some()).await;
    drive_one(&mut a, |a| a.controller.link_state(&peer_b).is_none()).await;
    assert!(a.controller.connected_peers().is_empty());
}
