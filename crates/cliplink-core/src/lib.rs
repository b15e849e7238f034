//! # Cliplink Core
//!
//! Pure primitives shared by every Cliplink crate: identifiers, clipboard
//! kinds and the bounded clipboard history.
//!
//! This crate contains no I/O, no networking and no cryptography.
//!
//! ## Key Types
//!
//! - [`RoomId`] - Opaque room identifier; also the seed of the room key
//! - [`UserId`] - Caller-supplied peer identifier (never verified)
//! - [`TransferId`] - 128-bit identifier of one chunked transfer
//! - [`ClipboardKind`] - Text, image or file
//! - [`History`] - Fixed-capacity ring of [`HistoryEntry`] values, newest first

pub mod clipboard;
pub mod error;
pub mod types;

pub use clipboard::{now_millis, ClipboardKind, History, HistoryEntry, Origin, HISTORY_CAPACITY};
pub use error::{CoreError, Result};
pub use types::{local_os, RoomId, TransferId, UserId};
