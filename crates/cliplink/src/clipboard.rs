//! Clipboard collaborator and content classification.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use cliplink_core::ClipboardKind;

use crate::error::Result;

/// Copied text at or above this length is never treated as a path.
pub const MAX_PATH_LEN: usize = 1024;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

/// Access to the OS clipboard.
#[async_trait]
pub trait ClipboardAccess: Send + Sync + 'static {
    /// Current text content, if any.
    async fn read_text(&self) -> Result<Option<String>>;

    async fn write_text(&self, text: &str) -> Result<()>;
}

/// How copied text is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// Sent as one sealed control message.
    Text(String),
    /// A path to a regular file, sent as a chunked transfer.
    File { path: PathBuf, kind: ClipboardKind },
}

/// Decide whether copied text names a local file.
///
/// Trimmed text shorter than [`MAX_PATH_LEN`], on one line, naming an
/// existing regular file (symlinks are not followed) is a file; it is an
/// image when its extension is a known image type.
pub async fn classify(text: &str) -> Classified {
    let trimmed = text.trim();
    if !trimmed.is_empty() && trimmed.len() < MAX_PATH_LEN && !trimmed.contains('\n') {
        if let Ok(meta) = tokio::fs::symlink_metadata(trimmed).await {
            if meta.is_file() {
                let path = PathBuf::from(trimmed);
                let kind = file_kind(&path);
                return Classified::File { path, kind };
            }
        }
    }
    Classified::Text(text.to_string())
}

/// Image or plain file, by extension.
pub fn file_kind(path: &Path) -> ClipboardKind {
    let is_image = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|i| e.eq_ignore_ascii_case(i)))
        .unwrap_or(false);
    if is_image {
        ClipboardKind::Image
    } else {
        ClipboardKind::File
    }
}

/// In-process clipboard for tests and headless runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    inner: Arc<RwLock<MemoryClipboardInner>>,
}

#[derive(Debug, Default)]
struct MemoryClipboardInner {
    text: Option<String>,
    writes: Vec<String>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the user copying `text`.
    pub fn set(&self, text: impl Into<String>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.text = Some(text.into());
    }

    pub fn get(&self) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.text.clone()
    }

    /// Every value written through [`ClipboardAccess::write_text`].
    pub fn writes(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.writes.clone()
    }
}

#[async_trait]
impl ClipboardAccess for MemoryClipboard {
    async fn read_text(&self) -> Result<Option<String>> {
        Ok(self.get())
    }

    async fn write_text(&self, text: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.text = Some(text.to_string());
        inner.writes.push(text.to_string());
        Ok(())
    }
}
