//! Client-side negotiation state, one link per remote peer.
//!
//! Links are sans-IO: they consume relayed server messages and return the
//! client messages that should go back through the relay. The actual media
//! stack sits behind [`MediaSession`].

use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::SignalError;
use crate::protocol::{ClientMessage, MessageKind, PeerId, Role, ServerMessage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MediaError(pub String);

/// The real-time media primitive a link drives. Descriptions and
/// candidates are opaque blobs.
pub trait MediaSession {
    fn create_offer(&mut self) -> Result<Value, MediaError>;
    fn create_answer(&mut self) -> Result<Value, MediaError>;
    fn set_remote_description(&mut self, description: &Value) -> Result<(), MediaError>;
    fn add_ice_candidate(&mut self, candidate: &Value) -> Result<(), MediaError>;
    /// Discard a local offer that lost a glare race.
    fn rollback_local_offer(&mut self) {}
    /// Release capture and transport resources tied to this link.
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Idle,
    Offering,
    AwaitingAnswer,
    Responding,
    Connected,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error("cannot handle {event} while {state:?}")]
    InvalidTransition {
        state: LinkState,
        event: &'static str,
    },
    #[error("link to {0} is closed")]
    Closed(PeerId),
    #[error("no negotiation link for peer {0}")]
    UnknownPeer(PeerId),
    #[error("media failure: {0}")]
    Media(#[from] MediaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    Applied,
    Buffered,
}

fn malformed(detail: impl Into<String>) -> NegotiationError {
    NegotiationError::Signal(SignalError::MalformedNegotiationPayload(detail.into()))
}

/// Reject descriptions that are plainly absent. Anything else is left to the
/// media session to judge.
fn validate_description(kind: &str, description: &Value) -> Result<(), NegotiationError> {
    let empty = match description {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => return Err(malformed(format!("{kind} description must be an object or string"))),
    };
    if empty {
        return Err(malformed(format!("{kind} description is missing")));
    }
    Ok(())
}

pub struct NegotiationLink<M> {
    remote: PeerId,
    role: Role,
    state: LinkState,
    remote_description_set: bool,
    pending_candidates: VecDeque<Value>,
    media: M,
}

impl<M: MediaSession> NegotiationLink<M> {
    pub fn new(remote: PeerId, role: Role, media: M) -> Self {
        Self {
            remote,
            role,
            state: LinkState::Idle,
            remote_description_set: false,
            pending_candidates: VecDeque::new(),
            media,
        }
    }

    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn buffered_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.state == LinkState::Closed {
            return Err(NegotiationError::Closed(self.remote.clone()));
        }
        Ok(())
    }

    fn transition(&mut self, next: LinkState) {
        debug!(peer_id = %self.remote, from = ?self.state, to = ?next, "link transition");
        self.state = next;
    }

    /// Begin negotiating as the offering side.
    pub fn start(&mut self) -> Result<ClientMessage, NegotiationError> {
        self.ensure_open()?;
        if self.state != LinkState::Idle {
            return Err(NegotiationError::InvalidTransition {
                state: self.state,
                event: "start",
            });
        }
        self.transition(LinkState::Offering);
        let offer = match self.media.create_offer() {
            Ok(offer) => offer,
            Err(err) => {
                self.transition(LinkState::Idle);
                return Err(err.into());
            }
        };
        self.transition(LinkState::AwaitingAnswer);
        Ok(ClientMessage::negotiation(
            MessageKind::Offer,
            self.remote.clone(),
            offer,
        ))
    }

    /// Handle a relayed offer. Returns the answer to send back, or `None`
    /// when this side wins a glare race and ignores the offer.
    pub fn on_offer(&mut self, offer: Value) -> Result<Option<ClientMessage>, NegotiationError> {
        self.ensure_open()?;
        match self.state {
            LinkState::Idle => self.respond(offer, false).map(Some),
            LinkState::Offering | LinkState::AwaitingAnswer => {
                if !self.role.is_polite() {
                    info!(peer_id = %self.remote, "glare: keeping local offer, ignoring remote offer");
                    return Ok(None);
                }
                self.respond(offer, true).map(Some)
            }
            state => Err(NegotiationError::InvalidTransition {
                state,
                event: "offer",
            }),
        }
    }

    /// The local offer is only withdrawn once media has accepted the remote
    /// one; a rejected offer leaves the link as it was.
    fn respond(&mut self, offer: Value, yielding: bool) -> Result<ClientMessage, NegotiationError> {
        validate_description("offer", &offer)?;
        self.media
            .set_remote_description(&offer)
            .map_err(|err| malformed(err.0))?;
        if yielding {
            info!(peer_id = %self.remote, "glare: yielding local offer to remote offer");
            self.media.rollback_local_offer();
        }
        self.remote_description_set = true;
        self.transition(LinkState::Responding);
        self.drain_candidates();

        let answer = match self.media.create_answer() {
            Ok(answer) => answer,
            Err(err) => {
                // Back to Idle so a retried offer is accepted.
                self.remote_description_set = false;
                self.transition(LinkState::Idle);
                return Err(err.into());
            }
        };
        self.transition(LinkState::Connected);
        Ok(ClientMessage::negotiation(
            MessageKind::Answer,
            self.remote.clone(),
            answer,
        ))
    }

    pub fn on_answer(&mut self, answer: Value) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        if self.state != LinkState::AwaitingAnswer {
            return Err(NegotiationError::InvalidTransition {
                state: self.state,
                event: "answer",
            });
        }
        validate_description("answer", &answer)?;
        self.media
            .set_remote_description(&answer)
            .map_err(|err| malformed(err.0))?;
        self.remote_description_set = true;
        self.transition(LinkState::Connected);
        self.drain_candidates();
        Ok(())
    }

    pub fn on_candidate(&mut self, candidate: Value) -> Result<CandidateDisposition, NegotiationError> {
        self.ensure_open()?;
        if candidate.is_null() {
            return Err(malformed("candidate is missing"));
        }
        if !self.remote_description_set {
            self.pending_candidates.push_back(candidate);
            debug!(
                peer_id = %self.remote,
                buffered = self.pending_candidates.len(),
                "buffered candidate until remote description is set"
            );
            return Ok(CandidateDisposition::Buffered);
        }
        self.media.add_ice_candidate(&candidate)?;
        Ok(CandidateDisposition::Applied)
    }

    /// Wrap a locally gathered candidate for the relay.
    pub fn local_candidate(&self, candidate: Value) -> Result<ClientMessage, NegotiationError> {
        self.ensure_open()?;
        Ok(ClientMessage::negotiation(
            MessageKind::IceCandidate,
            self.remote.clone(),
            candidate,
        ))
    }

    fn drain_candidates(&mut self) {
        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(err) = self.media.add_ice_candidate(&candidate) {
                warn!(peer_id = %self.remote, error = %err, "failed to apply buffered candidate");
            }
        }
    }

    /// Terminal. Calling twice is a no-op.
    pub fn close(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }
        self.pending_candidates.clear();
        self.media.close();
        self.transition(LinkState::Closed);
    }
}

/// All links of one client, driven by the server's notifications.
pub struct LinkTable<M, F> {
    local: Option<PeerId>,
    links: HashMap<PeerId, NegotiationLink<M>>,
    factory: F,
}

impl<M, F> LinkTable<M, F>
where
    M: MediaSession,
    F: FnMut(&PeerId) -> M,
{
    pub fn new(factory: F) -> Self {
        Self {
            local: None,
            links: HashMap::new(),
            factory,
        }
    }

    /// Our own identity, once the server has announced it.
    pub fn local_id(&self) -> Option<&PeerId> {
        self.local.as_ref()
    }

    pub fn link(&self, peer: &PeerId) -> Option<&NegotiationLink<M>> {
        self.links.get(peer)
    }

    pub fn links(&self) -> impl Iterator<Item = &NegotiationLink<M>> {
        self.links.values()
    }

    fn link_mut(&mut self, peer: &PeerId) -> Result<&mut NegotiationLink<M>, NegotiationError> {
        self.links
            .get_mut(peer)
            .ok_or_else(|| NegotiationError::UnknownPeer(peer.clone()))
    }

    /// Create a link, replacing (never reviving) any previous one.
    fn open(&mut self, peer: PeerId, role: Role) -> Result<Vec<ClientMessage>, NegotiationError> {
        if let Some(mut previous) = self.links.remove(&peer) {
            previous.close();
        }
        let media = (self.factory)(&peer);
        let mut link = NegotiationLink::new(peer.clone(), role, media);
        let started = match role {
            Role::Initiator => link.start().map(|offer| vec![offer]),
            Role::Responder => Ok(Vec::new()),
        };
        // A link whose first offer failed stays in the table, Idle, so
        // `reset` can retry it and `PeerLeft` still releases its media.
        info!(peer_id = %peer, role = ?role, "opened negotiation link");
        self.links.insert(peer, link);
        started
    }

    /// Feed one server message; returns what to send back.
    pub fn handle(&mut self, message: ServerMessage) -> Result<Vec<ClientMessage>, NegotiationError> {
        match message {
            ServerMessage::Welcome { peer_id, .. } => {
                self.local = Some(peer_id);
                Ok(Vec::new())
            }
            ServerMessage::Paired { peer_id, role } => self.open(peer_id, role),
            ServerMessage::PeerJoined { peer_id, .. } => self.open(peer_id, Role::Initiator),
            ServerMessage::RoomMembers { members } => {
                let mut outgoing = Vec::new();
                for member in members {
                    outgoing.extend(self.open(member.peer_id, Role::Responder)?);
                }
                Ok(outgoing)
            }
            ServerMessage::PeerLeft { peer_id } => {
                if let Some(mut link) = self.links.remove(&peer_id) {
                    link.close();
                }
                Ok(Vec::new())
            }
            ServerMessage::Offer { from, offer } => {
                let answer = self.link_mut(&from)?.on_offer(offer)?;
                Ok(answer.into_iter().collect())
            }
            ServerMessage::Answer { from, answer } => {
                self.link_mut(&from)?.on_answer(answer)?;
                Ok(Vec::new())
            }
            ServerMessage::IceCandidate { from, candidate } => {
                self.link_mut(&from)?.on_candidate(candidate)?;
                Ok(Vec::new())
            }
            ServerMessage::Pong => Ok(Vec::new()),
            ServerMessage::Error { code, message } => {
                warn!(code = %code, message = %message, "server rejected a message");
                Ok(Vec::new())
            }
        }
    }

    /// Retry: close the link and negotiate again on a fresh one with the
    /// same role.
    pub fn reset(&mut self, peer: &PeerId) -> Result<Vec<ClientMessage>, NegotiationError> {
        let role = self.link_mut(peer)?.role();
        self.open(peer.clone(), role)
    }

    pub fn close_all(&mut self) {
        for (_, mut link) in self.links.drain() {
            link.close();
        }
    }
}
