//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use cliplink_core::{local_os, UserId};
use cliplink_crypto::KdfConfig;
use cliplink_sync::{DirectorySinkProvider, ReassemblyConfig, SignalingConfig, TransferConfig};

/// Configuration for a [`SyncController`](crate::SyncController).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// This device's identifier in every room.
    pub user_id: UserId,
    /// OS tag advertised on join.
    pub os: String,
    /// Relay connection.
    pub signaling: SignalingConfig,
    /// How often the clipboard is read.
    pub poll_interval: Duration,
    /// Where received files are written.
    pub download_dir: PathBuf,
    /// Room key derivation parameters; identical across a room.
    pub kdf: KdfConfig,
    pub transfer: TransferConfig,
    pub reassembly: ReassemblyConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_id: UserId::random(),
            os: local_os(),
            signaling: SignalingConfig::default(),
            poll_interval: Duration::from_secs(1),
            download_dir: PathBuf::from("downloads"),
            kdf: KdfConfig::default(),
            transfer: TransferConfig::default(),
            reassembly: ReassemblyConfig::default(),
        }
    }
}

impl ClientConfig {
    /// A sink provider writing into [`download_dir`](Self::download_dir).
    pub fn download_sinks(&self) -> DirectorySinkProvider {
        DirectorySinkProvider::new(&self.download_dir)
    }
}
