//! Message routing.
//!
//! [`Relay`] owns the [`RoomRegistry`] and one outbox per connected
//! session. It holds no negotiation semantics: every decision is keyed by
//! room and optional target.

use std::collections::HashMap;

use tokio::sync::mpsc;

use cliplink_core::{RoomId, UserId};

use crate::messages::{ExistingPeers, Join, PeerLeft, RendezvousMessage};
use crate::registry::{Member, RoomRegistry, SessionId};

/// Outbound text frames for one session.
pub type Outbox = mpsc::UnboundedSender<String>;

/// The room router.
#[derive(Debug, Default)]
pub struct Relay {
    registry: RoomRegistry,
    outboxes: HashMap<SessionId, Outbox>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Register a freshly accepted session.
    pub fn connect(&mut self, session: SessionId, outbox: Outbox) {
        tracing::debug!(session, "session connected");
        self.outboxes.insert(session, outbox);
    }

    /// Tear down a session: leave its room and notify the remaining members.
    pub fn disconnect(&mut self, session: SessionId) {
        self.leave_room(session);
        self.outboxes.remove(&session);
        tracing::debug!(session, "session closed");
    }

    /// Route one inbound text frame.
    ///
    /// Malformed or misplaced messages are logged and dropped; the session
    /// stays open.
    pub fn handle_text(&mut self, session: SessionId, text: &str) {
        let message = match RendezvousMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(session, error = %e, "dropping unparseable message");
                return;
            }
        };

        match message {
            RendezvousMessage::Join(join) => self.join(session, join),
            RendezvousMessage::Signal(mut signal) => {
                let Some((room, sender)) = self.joined(session, "signal") else {
                    return;
                };
                signal.sender_id = Some(sender);
                let target = signal.target.clone();
                let forwarded = RendezvousMessage::Signal(signal);

                match target {
                    Some(target) => {
                        let sessions = self.registry.sessions_for(&room, &target);
                        if sessions.is_empty() {
                            tracing::debug!(session, target = %target, "signal target not in room");
                        }
                        for recipient in sessions {
                            self.send(recipient, &forwarded);
                        }
                    }
                    None => self.broadcast(&room, session, &forwarded),
                }
            }
            RendezvousMessage::Clipboard(mut clipboard) => {
                let Some((room, sender)) = self.joined(session, "clipboard") else {
                    return;
                };
                clipboard.sender_id = Some(sender);
                self.broadcast(&room, session, &RendezvousMessage::Clipboard(clipboard));
            }
            other @ (RendezvousMessage::ExistingPeers(_)
            | RendezvousMessage::PeerJoined(_)
            | RendezvousMessage::PeerLeft(_)) => {
                tracing::warn!(session, kind = other.kind(), "dropping relay-only message from client");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn join(&mut self, session: SessionId, join: Join) {
        if join.room_id.as_str().is_empty() || join.user_id.is_empty() {
            tracing::warn!(session, "dropping join with empty room or user id");
            return;
        }

        self.leave_room(session);

        let member = Member {
            session,
            user_id: join.user_id,
            os: join.os,
        };
        let announced = RendezvousMessage::PeerJoined(member.info());
        let peers = self.registry.join(join.room_id.clone(), member);

        tracing::info!(
            session,
            room = %join.room_id,
            peers = peers.len(),
            "session joined room"
        );

        self.send(session, &RendezvousMessage::ExistingPeers(ExistingPeers { peers }));
        self.broadcast(&join.room_id, session, &announced);
    }

    fn leave_room(&mut self, session: SessionId) {
        if let Some((room, member)) = self.registry.leave(session) {
            tracing::info!(session, room = %room, user = %member.user_id, "session left room");
            let left = RendezvousMessage::PeerLeft(PeerLeft {
                user_id: member.user_id,
            });
            self.broadcast(&room, session, &left);
        }
    }

    /// Room and user id of a joined session, or `None` after logging.
    fn joined(&self, session: SessionId, kind: &str) -> Option<(RoomId, UserId)> {
        match self.registry.member(session) {
            Some(member) => {
                let room = self.registry.room_of(session)?.clone();
                Some((room, member.user_id.clone()))
            }
            None => {
                tracing::warn!(session, kind, "dropping message from session outside any room");
                None
            }
        }
    }

    fn broadcast(&self, room: &RoomId, except: SessionId, message: &RendezvousMessage) {
        let recipients: Vec<SessionId> =
            self.registry.others(room, except).map(|m| m.session).collect();
        for recipient in recipients {
            self.send(recipient, message);
        }
    }

    fn send(&self, session: SessionId, message: &RendezvousMessage) {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(session, error = %e, "failed to encode outbound message");
                return;
            }
        };
        match self.outboxes.get(&session) {
            Some(outbox) => {
                if outbox.send(text).is_err() {
                    tracing::debug!(session, "outbox closed; session is going away");
                }
            }
            None => tracing::debug!(session, "no outbox for session"),
        }
    }
}
