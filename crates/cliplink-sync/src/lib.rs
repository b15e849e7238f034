//! # Cliplink Sync
//!
//! Peer links, control messages and chunked transfers.
//!
//! ## Overview
//!
//! Peers find each other through the relay ([`signaling`]) and then talk
//! directly over a [`PeerLink`]: one connection carrying two reliable data
//! channels.
//!
//! - `universal-clipboard` carries JSON [`ControlMessage`]s (sealed text and
//!   transfer start/end).
//! - `file-transfer` carries binary [`ChunkFrame`]s.
//!
//! The network side sits behind the [`PeerTransport`] trait; an in-memory
//! implementation is provided for tests and local demos.
//!
//! ## Key Properties
//!
//! - **Sealed**: every payload and every chunk is authenticated with the
//!   room key; a bad tag aborts the transfer
//! - **Order-tolerant**: frames and control messages may arrive in any order
//! - **Bounded**: buffered frames and concurrent transfers are capped
//! - **Flow-controlled**: the sender pauses on the file channel's
//!   buffered-amount signal
//!
//! ## Transfer Flow
//!
//! ```text
//! Sender                                   Receiver
//!   |-- start(id, name, total) [control] -->|  sink created
//!   |-- frame 0 .. total-1 [file] --------->|  reordered, opened, written
//!   |-- end(id) [control] ----------------->|  sink finished
//! ```

pub mod error;
pub mod frame;
pub mod link;
pub mod messages;
pub mod receiver;
pub mod sender;
pub mod signaling;
pub mod sink;
pub mod transport;

pub use error::{Result, SyncError};
pub use frame::{ChunkFrame, HEADER_LEN};
pub use link::{LinkState, PeerLink, Role};
pub use messages::{ClipboardMessage, ControlMessage, FileTransferMessage};
pub use receiver::{Reassembler, ReassemblyConfig, TransferOutcome};
pub use sender::{TransferConfig, TransferReport, TransferSender};
pub use signaling::{
    run_signaling, spawn_signaling, SignalingConfig, SignalingEvent, SignalingHandle,
};
pub use sink::{
    sanitize_file_name, DirectorySinkProvider, MemorySinkProvider, ReceivedFile, SinkProvider,
    TransferSink,
};
pub use transport::{
    memory::MemoryChannel, memory::MemoryConnection, memory::MemoryPeerNetwork,
    memory::MemoryTransport, ChannelLabel, ChannelOf, DataChannel, LinkEvent, LinkEventKind,
    LinkId, PeerConnection, PeerTransport,
};
