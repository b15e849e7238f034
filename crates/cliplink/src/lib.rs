//! # Cliplink
//!
//! Clipboard sync across devices over encrypted peer links.
//!
//! ## Overview
//!
//! A [`SyncController`] joins a room on a rendezvous relay, negotiates a
//! direct link with every other member and then keeps clipboards in sync:
//!
//! - **Text** goes to every connected peer as one sealed control message
//! - **Files and images** (a copied path naming a regular file) go as a
//!   chunked transfer, one task per peer
//! - **Received files** are written through a [`SinkProvider`] and recorded
//!   in the history as `File received: <name>`
//!
//! Every member derives the same room key from the room id, so the relay
//! never sees plaintext.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cliplink::{ClientConfig, MemoryClipboard, SyncController};
//! use cliplink::core::RoomId;
//! use cliplink::sync::MemoryPeerNetwork;
//!
//! async fn example() {
//!     let config = ClientConfig::default();
//!     let network = MemoryPeerNetwork::new();
//!     let transport = network.transport(config.user_id.clone());
//!     let sinks = config.download_sinks();
//!
//!     let (mut controller, _signaling) =
//!         SyncController::connect(config, transport, sinks, MemoryClipboard::new());
//!     controller.join_room(RoomId::new("abc123").unwrap()).await.unwrap();
//!     controller.run().await;
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `cliplink::core` - Identifiers, clipboard kinds, history
//! - `cliplink::crypto` - Room keys, envelopes, compression
//! - `cliplink::relay` - Rendezvous messages and the relay server
//! - `cliplink::sync` - Peer links, frames, transfers, signaling

pub mod clipboard;
pub mod config;
pub mod controller;
pub mod error;

// Re-export component crates
pub use cliplink_core as core;
pub use cliplink_crypto as crypto;
pub use cliplink_relay as relay;
pub use cliplink_sync as sync;

pub use clipboard::{classify, file_kind, Classified, ClipboardAccess, MemoryClipboard, MAX_PATH_LEN};
pub use config::ClientConfig;
pub use controller::{ControllerEvent, SyncController};
pub use error::{ClientError, Result};

pub use cliplink_core::{ClipboardKind, History, HistoryEntry, Origin, RoomId, UserId};
pub use cliplink_sync::{DirectorySinkProvider, MemorySinkProvider, SinkProvider};
