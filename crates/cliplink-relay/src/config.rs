//! Relay configuration.

use std::net::SocketAddr;

/// Configuration for the relay server.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Largest accepted WebSocket message, in bytes.
    pub max_message_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_message_size: 1024 * 1024,
        }
    }
}
