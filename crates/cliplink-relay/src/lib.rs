//! # Cliplink Relay
//!
//! A room-scoped rendezvous broker. Peers connect over WebSocket, join a
//! room by identifier, learn about each other and exchange connection
//! negotiation messages. Once peers have a direct link the relay carries
//! nothing else.
//!
//! ## Message Flow
//!
//! ```text
//! Peer C                 Relay                  Peers A, B
//!   |--- join r1 -------->|                         |
//!   |<-- existing-peers --|                         |
//!   |                     |--- peer-joined C ------>|
//!   |--- signal(A) ------>|--- signal(sender C) --->| (A only)
//!   |                     |<-- signal(A → C) -------|
//!   |<-- signal(sender A)-|                         |
//!   x (close)             |--- peer-left C -------->|
//! ```
//!
//! The relay holds only live membership: nothing is cached, and a room
//! disappears with its last member.

pub mod config;
pub mod error;
pub mod messages;
pub mod registry;
pub mod relay;
pub mod server;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use messages::{
    ExistingPeers, IceCandidate, Join, LegacyClipboard, PeerInfo, PeerLeft, RendezvousMessage,
    SdpKind, SessionDescription, SignalMessage, SignalPayload, SignalType,
};
pub use registry::{Member, RoomRegistry, SessionId};
pub use relay::{Outbox, Relay};
pub use server::{run_relay, RelayEvent, RelayServer};
