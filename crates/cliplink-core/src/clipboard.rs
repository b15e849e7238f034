//! Clipboard kinds and the bounded history ring.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::types::UserId;

/// Default number of entries kept in a [`History`].
pub const HISTORY_CAPACITY: usize = 20;

/// What a clipboard item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardKind {
    /// Plain text, sent as a single control message.
    Text,
    /// An image file, sent as a chunked transfer.
    Image,
    /// Any other file, sent as a chunked transfer.
    File,
}

impl ClipboardKind {
    /// Whether this kind travels over the chunked transfer protocol.
    pub fn is_transfer(&self) -> bool {
        matches!(self, ClipboardKind::Image | ClipboardKind::File)
    }
}

/// Where a history entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "origin", content = "userId")]
pub enum Origin {
    /// Copied on this device.
    Local,
    /// Received from a peer.
    Remote(UserId),
}

/// One clipboard history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Item kind.
    #[serde(rename = "type")]
    pub kind: ClipboardKind,
    /// Display content: the text itself, or a "File ..." caption.
    pub content: String,
    /// Who produced the item.
    pub origin: Origin,
    /// When the entry was recorded (Unix ms).
    pub timestamp: i64,
}

impl HistoryEntry {
    /// Entry for text copied locally.
    pub fn local_text(text: impl Into<String>) -> Self {
        Self {
            kind: ClipboardKind::Text,
            content: text.into(),
            origin: Origin::Local,
            timestamp: now_millis(),
        }
    }

    /// Entry for a file or image copied locally.
    pub fn local_file(kind: ClipboardKind, file_name: &str) -> Self {
        Self {
            kind,
            content: format!("File: {}", file_name),
            origin: Origin::Local,
            timestamp: now_millis(),
        }
    }

    /// Entry for text received from a peer.
    pub fn received_text(text: impl Into<String>, sender: UserId) -> Self {
        Self {
            kind: ClipboardKind::Text,
            content: text.into(),
            origin: Origin::Remote(sender),
            timestamp: now_millis(),
        }
    }

    /// Entry for a completed incoming transfer.
    pub fn received_file(file_name: &str, sender: UserId) -> Self {
        Self {
            kind: ClipboardKind::File,
            content: format!("File received: {}", file_name),
            origin: Origin::Remote(sender),
            timestamp: now_millis(),
        }
    }
}

/// Fixed-capacity clipboard history, newest entry first.
///
/// Pushing into a full history evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl History {
    /// Create a history holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a new entry at the front.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_front(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    /// Iterate newest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// The most recent entry.
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry (used when switching rooms).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

/// Get current time in milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
