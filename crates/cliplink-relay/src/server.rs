//! WebSocket front end.
//!
//! One task owns the [`Relay`]; every accepted connection gets its own task
//! that forwards inbound text frames to the relay task as [`RelayEvent`]s and
//! writes whatever the relay queues into its outbox.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

use crate::config::RelayConfig;
use crate::error::Result;
use crate::registry::SessionId;
use crate::relay::{Outbox, Relay};

/// What connection tasks tell the relay task.
#[derive(Debug)]
pub enum RelayEvent {
    Connected { session: SessionId, outbox: Outbox },
    Text { session: SessionId, text: String },
    Closed { session: SessionId },
}

/// A bound relay server.
pub struct RelayServer {
    listener: TcpListener,
    config: RelayConfig,
}

impl RelayServer {
    /// Bind the listening socket.
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        Ok(Self { listener, config })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails.
    pub async fn serve(self) -> Result<()> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_relay(Relay::new(), events_rx));

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_message_size);

        tracing::info!(addr = %self.listener.local_addr()?, "relay listening");

        let mut next_session: SessionId = 0;
        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            next_session += 1;
            let session = next_session;
            tracing::debug!(session, %peer_addr, "accepted connection");

            tokio::spawn(handle_connection(
                stream,
                session,
                ws_config.clone(),
                events_tx.clone(),
            ));
        }
    }
}

/// Apply events to the relay, one at a time, until every sender is gone.
pub async fn run_relay(mut relay: Relay, mut events: mpsc::UnboundedReceiver<RelayEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            RelayEvent::Connected { session, outbox } => relay.connect(session, outbox),
            RelayEvent::Text { session, text } => relay.handle_text(session, &text),
            RelayEvent::Closed { session } => relay.disconnect(session),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    session: SessionId,
    ws_config: WebSocketConfig,
    events: mpsc::UnboundedSender<RelayEvent>,
) {
    let ws_stream = match tokio_tungstenite::accept_async_with_config(stream, Some(ws_config)).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(session, error = %e, "websocket handshake failed");
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<String>();

    if events.send(RelayEvent::Connected { session, outbox }).is_err() {
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(text) = outbox_rx.recv().await {
            if write.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    while let Some(next) = read.next().await {
        match next {
            Ok(Message::Text(text)) => {
                if events.send(RelayEvent::Text { session, text }).is_err() {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!(session, "dropping binary frame");
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(session, error = %e, "read failed");
                break;
            }
        }
    }

    // Dropping the relay's outbox ends the writer.
    let _ = events.send(RelayEvent::Closed { session });
    let _ = writer.await;
}
