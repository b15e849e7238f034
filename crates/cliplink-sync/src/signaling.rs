//! Rendezvous client.
//!
//! A single task owns the WebSocket connection to the relay. It forwards
//! decoded [`RendezvousMessage`]s to the controller, writes whatever the
//! controller queues through a [`SignalingHandle`], and reconnects after a
//! fixed delay whenever the connection drops.
//!
//! Messages queued while disconnected are discarded on reconnect; the
//! controller re-joins its room when it sees [`SignalingEvent::Connected`].

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use cliplink_relay::RendezvousMessage;

use crate::error::{Result, SyncError};

/// Configuration for the rendezvous client.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Relay URL, e.g. `ws://localhost:3000`.
    pub url: String,
    /// Wait between connection attempts.
    pub reconnect_delay: Duration,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000".to_string(),
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

/// What the client reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// A (re)connection succeeded; the session is not in any room.
    Connected,
    Message(RendezvousMessage),
    Disconnected,
}

/// Queues messages for the relay.
#[derive(Debug, Clone)]
pub struct SignalingHandle {
    tx: mpsc::UnboundedSender<RendezvousMessage>,
}

impl SignalingHandle {
    /// Build a handle and the receiver [`run_signaling`] drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RendezvousMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, message: RendezvousMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| SyncError::ChannelClosed("signaling".into()))
    }
}

/// Spawn the client task.
pub fn spawn_signaling(
    config: SignalingConfig,
    events: mpsc::UnboundedSender<SignalingEvent>,
) -> (SignalingHandle, JoinHandle<()>) {
    let (handle, outbound) = SignalingHandle::channel();
    let task = tokio::spawn(run_signaling(config, outbound, events));
    (handle, task)
}

/// Connect, pump messages and reconnect until the event receiver or every
/// handle is dropped.
pub async fn run_signaling(
    config: SignalingConfig,
    mut outbound: mpsc::UnboundedReceiver<RendezvousMessage>,
    events: mpsc::UnboundedSender<SignalingEvent>,
) {
    loop {
        if events.is_closed() {
            return;
        }

        match tokio_tungstenite::connect_async(config.url.as_str()).await {
            Ok((ws_stream, _)) => {
                while outbound.try_recv().is_ok() {}

                tracing::info!(url = %config.url, "connected to relay");
                if events.send(SignalingEvent::Connected).is_err() {
                    return;
                }

                let (mut write, mut read) = ws_stream.split();
                loop {
                    tokio::select! {
                        next = outbound.recv() => match next {
                            Some(message) => {
                                let text = match message.to_json() {
                                    Ok(text) => text,
                                    Err(e) => {
                                        tracing::warn!(error = %e, "dropping unencodable message");
                                        continue;
                                    }
                                };
                                if let Err(e) = write.send(Message::Text(text)).await {
                                    tracing::warn!(error = %e, "relay write failed");
                                    break;
                                }
                            }
                            None => {
                                let _ = write.close().await;
                                return;
                            }
                        },
                        inbound = read.next() => match inbound {
                            Some(Ok(Message::Text(text))) => match RendezvousMessage::from_json(&text) {
                                Ok(message) => {
                                    if events.send(SignalingEvent::Message(message)).is_err() {
                                        return;
                                    }
                                }
                                Err(e) => tracing::warn!(error = %e, "ignoring malformed relay message"),
                            },
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::debug!(error = %e, "relay read failed");
                                break;
                            }
                        },
                    }
                }

                tracing::warn!(url = %config.url, "disconnected from relay");
                if events.send(SignalingEvent::Disconnected).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(url = %config.url, error = %e, "relay connection failed");
            }
        }

        tokio::time::sleep(config.reconnect_delay).await;
    }
}
