//! Peer link state machine.
//!
//! ```text
//! Idle --initiate--> Negotiating(Initiator) --on_answer--+
//!   |                                                    +--both channels open--> Connected
//!   +---respond----> Negotiating(Responder) -------------+
//!
//! any state --close--> Closed
//! ```
//!
//! Transitions return the description to signal (if any); the caller sends
//! it through the relay. Remote candidates that arrive before a remote
//! description are queued and applied once it is set.

use std::sync::Arc;

use cliplink_core::UserId;
use cliplink_relay::{IceCandidate, SessionDescription};

use crate::error::{Result, SyncError};
use crate::transport::{ChannelLabel, DataChannel, LinkId, PeerConnection};

/// Which side created the offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Negotiation state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Negotiating(Role),
    Connected,
    Closed,
}

/// A link to one remote peer.
pub struct PeerLink<C: PeerConnection> {
    id: LinkId,
    remote: UserId,
    state: LinkState,
    role: Option<Role>,
    connection: C,
    control: Option<Arc<C::Channel>>,
    file: Option<Arc<C::Channel>>,
    control_open: bool,
    file_open: bool,
    has_remote_description: bool,
    pending_candidates: Vec<IceCandidate>,
}

impl<C: PeerConnection> PeerLink<C> {
    pub fn new(id: LinkId, remote: UserId, connection: C) -> Self {
        Self {
            id,
            remote,
            state: LinkState::Idle,
            role: None,
            connection,
            control: None,
            file: None,
            control_open: false,
            file_open: false,
            has_remote_description: false,
            pending_candidates: Vec::new(),
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn remote(&self) -> &UserId {
        &self.remote
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// The control channel, once connected.
    pub fn control_channel(&self) -> Option<Arc<C::Channel>> {
        self.connected_channel(&self.control)
    }

    /// The file channel, once connected.
    pub fn file_channel(&self) -> Option<Arc<C::Channel>> {
        self.connected_channel(&self.file)
    }

    fn connected_channel(&self, slot: &Option<Arc<C::Channel>>) -> Option<Arc<C::Channel>> {
        if self.is_connected() {
            slot.as_ref().filter(|c| c.is_open()).cloned()
        } else {
            None
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Open both channels and produce an offer.
    pub async fn initiate(&mut self) -> Result<SessionDescription> {
        self.expect_state(LinkState::Idle, "initiate")?;

        self.control = Some(self.connection.open_channel(ChannelLabel::Control).await?);
        self.file = Some(self.connection.open_channel(ChannelLabel::File).await?);
        let offer = self.connection.create_offer().await?;

        self.enter_negotiation(Role::Initiator);
        Ok(offer)
    }

    /// Apply a remote offer and produce an answer.
    pub async fn respond(&mut self, offer: SessionDescription) -> Result<SessionDescription> {
        self.expect_state(LinkState::Idle, "respond")?;

        self.connection.set_remote_description(offer).await?;
        self.has_remote_description = true;
        self.flush_candidates().await?;
        let answer = self.connection.create_answer().await?;

        self.enter_negotiation(Role::Responder);
        Ok(answer)
    }

    /// Apply the remote answer (initiator only).
    pub async fn on_answer(&mut self, answer: SessionDescription) -> Result<()> {
        self.expect_state(LinkState::Negotiating(Role::Initiator), "answer")?;
        if self.has_remote_description {
            return Err(SyncError::InvalidState("duplicate answer".into()));
        }

        self.connection.set_remote_description(answer).await?;
        self.has_remote_description = true;
        self.flush_candidates().await
    }

    /// Apply or queue a remote candidate.
    pub async fn on_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        if self.state == LinkState::Closed {
            return Err(SyncError::InvalidState("candidate for closed link".into()));
        }
        if self.has_remote_description {
            self.connection.add_candidate(candidate).await
        } else {
            self.pending_candidates.push(candidate);
            Ok(())
        }
    }

    /// Adopt a channel the remote opened (responder side).
    pub fn on_inbound_channel(&mut self, channel: Arc<C::Channel>) -> Result<()> {
        if self.state == LinkState::Closed {
            return Err(SyncError::InvalidState("channel for closed link".into()));
        }
        match ChannelLabel::from_label(channel.label()) {
            Some(ChannelLabel::Control) => self.control = Some(channel),
            Some(ChannelLabel::File) => self.file = Some(channel),
            None => {
                return Err(SyncError::InvalidMessage(format!(
                    "unexpected channel label {:?}",
                    channel.label()
                )))
            }
        }
        Ok(())
    }

    /// Record an open channel. Returns true when this made the link connected.
    pub fn on_channel_open(&mut self, label: ChannelLabel) -> bool {
        match label {
            ChannelLabel::Control => self.control_open = true,
            ChannelLabel::File => self.file_open = true,
        }

        let ready = self.control_open
            && self.file_open
            && self.control.is_some()
            && self.file.is_some();
        if ready && matches!(self.state, LinkState::Negotiating(_)) {
            self.state = LinkState::Connected;
            tracing::info!(remote = %self.remote, link = %self.id, "peer link connected");
            return true;
        }
        false
    }

    /// Release channels and the connection.
    pub async fn close(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }
        self.state = LinkState::Closed;
        self.control = None;
        self.file = None;
        self.pending_candidates.clear();
        self.connection.close().await;
        tracing::debug!(remote = %self.remote, link = %self.id, "peer link closed");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn expect_state(&self, expected: LinkState, step: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SyncError::InvalidState(format!(
                "{} in state {:?}",
                step, self.state
            )))
        }
    }

    fn enter_negotiation(&mut self, role: Role) {
        self.role = Some(role);
        self.state = LinkState::Negotiating(role);
    }

    async fn flush_candidates(&mut self) -> Result<()> {
        for candidate in std::mem::take(&mut self.pending_candidates) {
            self.connection.add_candidate(candidate).await?;
        }
        Ok(())
    }
}
