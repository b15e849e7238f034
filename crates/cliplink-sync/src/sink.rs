//! Destinations for received transfers.
//!
//! A [`SinkProvider`] creates one [`TransferSink`] per transfer once its
//! file name is known. Sinks receive chunks strictly in order and are either
//! finished (the file becomes visible) or aborted (partial output is
//! discarded). Implementations include a download directory and an
//! in-memory collector for tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use cliplink_core::now_millis;

use crate::error::Result;

/// A finished transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Base name as announced by the sender.
    pub name: String,
    /// Where the file was written (None for in-memory sinks).
    pub path: Option<PathBuf>,
    /// Total bytes written.
    pub len: u64,
}

/// Ordered byte sink for one transfer.
#[async_trait]
pub trait TransferSink: Send {
    /// Append the next chunk.
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()>;

    /// Make the output visible.
    async fn finish(self: Box<Self>) -> Result<ReceivedFile>;

    /// Discard partial output.
    async fn abort(self: Box<Self>);
}

/// Factory for sinks.
#[async_trait]
pub trait SinkProvider: Send + Sync {
    /// Create a sink for a file called `file_name` (already reduced to a
    /// base name).
    async fn create(&self, file_name: &str) -> Result<Box<dyn TransferSink>>;
}

/// Reduce a wire-supplied file name to a safe base name.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    match base {
        "" | "." | ".." => "download".to_string(),
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory sink
// ─────────────────────────────────────────────────────────────────────────────

/// Writes received files into a download directory.
///
/// Output goes to `<timestamp>-<name>.part` and is renamed to
/// `<timestamp>-<name>` on finish.
#[derive(Debug, Clone)]
pub struct DirectorySinkProvider {
    dir: PathBuf,
}

impl DirectorySinkProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SinkProvider for DirectorySinkProvider {
    async fn create(&self, file_name: &str) -> Result<Box<dyn TransferSink>> {
        fs::create_dir_all(&self.dir).await?;

        let name = sanitize_file_name(file_name);
        let final_path = self.dir.join(format!("{}-{}", now_millis(), name));
        let mut part_name = final_path.clone().into_os_string();
        part_name.push(".part");
        let part_path = PathBuf::from(part_name);

        let file = fs::File::create(&part_path).await?;
        Ok(Box::new(DirectorySink {
            name,
            part_path,
            final_path,
            file,
            len: 0,
        }))
    }
}

struct DirectorySink {
    name: String,
    part_path: PathBuf,
    final_path: PathBuf,
    file: fs::File,
    len: u64,
}

#[async_trait]
impl TransferSink for DirectorySink {
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data).await?;
        self.len += data.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<ReceivedFile> {
        let DirectorySink {
            name,
            part_path,
            final_path,
            mut file,
            len,
        } = *self;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&part_path, &final_path).await?;
        Ok(ReceivedFile {
            name,
            path: Some(final_path),
            len,
        })
    }

    async fn abort(self: Box<Self>) {
        let DirectorySink { part_path, file, .. } = *self;
        drop(file);
        if let Err(e) = fs::remove_file(&part_path).await {
            tracing::warn!(path = %part_path.display(), error = %e, "failed to remove partial file");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory sink
// ─────────────────────────────────────────────────────────────────────────────

/// Collects finished transfers in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySinkProvider {
    finished: Arc<Mutex<Vec<(ReceivedFile, Vec<u8>)>>>,
    aborted: Arc<Mutex<usize>>,
}

impl MemorySinkProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every finished file with its contents, in completion order.
    pub async fn finished(&self) -> Vec<(ReceivedFile, Vec<u8>)> {
        self.finished.lock().await.clone()
    }

    /// Number of sinks that were aborted.
    pub async fn aborted(&self) -> usize {
        *self.aborted.lock().await
    }
}

#[async_trait]
impl SinkProvider for MemorySinkProvider {
    async fn create(&self, file_name: &str) -> Result<Box<dyn TransferSink>> {
        Ok(Box::new(MemorySink {
            name: sanitize_file_name(file_name),
            data: Vec::new(),
            provider: self.clone(),
        }))
    }
}

struct MemorySink {
    name: String,
    data: Vec<u8>,
    provider: MemorySinkProvider,
}

#[async_trait]
impl TransferSink for MemorySink {
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<ReceivedFile> {
        let MemorySink {
            name,
            data,
            provider,
        } = *self;
        let file = ReceivedFile {
            name,
            path: None,
            len: data.len() as u64,
        };
        provider
            .finished
            .lock()
            .await
            .push((file.clone(), data));
        Ok(file)
    }

    async fn abort(self: Box<Self>) {
        *self.provider.aborted.lock().await += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("/etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("..\\..\\boot.ini"), "boot.ini");
        assert_eq!(sanitize_file_name("dir/"), "download");
        assert_eq!(sanitize_file_name(".."), "download");
    }

    #[tokio::test]
    async fn test_directory_sink_finish() {
        let dir = tempfile::tempdir().unwrap();
        let provider = DirectorySinkProvider::new(dir.path().join("downloads"));

        let mut sink = provider.create("notes.txt").await.unwrap();
        sink.write_chunk(b"hello ").await.unwrap();
        sink.write_chunk(b"world").await.unwrap();
        let file = sink.finish().await.unwrap();

        let path = file.path.unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with("-notes.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
        assert_eq!(file.len, 11);

        let entries: Vec<_> = std::fs::read_dir(provider.dir()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_directory_sink_abort_removes_part() {
        let dir = tempfile::tempdir().unwrap();
        let provider = DirectorySinkProvider::new(dir.path());

        let mut sink = provider.create("big.bin").await.unwrap();
        sink.write_chunk(&[0u8; 128]).await.unwrap();
        sink.abort().await;

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let provider = MemorySinkProvider::new();
        let mut sink = provider.create("a/b.png").await.unwrap();
        sink.write_chunk(b"png").await.unwrap();
        sink.finish().await.unwrap();

        let aborted = provider.create("x").await.unwrap();
        aborted.abort().await;

        let finished = provider.finished().await;
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].0.name, "b.png");
        assert_eq!(finished[0].1, b"png");
        assert_eq!(provider.aborted().await, 1);
    }
}
