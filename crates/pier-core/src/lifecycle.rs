use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::SignalError;
use crate::matcher::{build_matcher, Matcher};
use crate::protocol::{ClientMessage, MatchPolicy, MessageKind, PeerId, ServerMessage};
use crate::registry::{Participant, Registry};
use crate::relay;

/// Channel feeding one connection's writer task.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// What a successfully handled client message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Joined,
    Relayed(MessageKind),
    Pong,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStats {
    pub policy: MatchPolicy,
    pub participants: usize,
    pub joined: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting: Option<PeerId>,
}

/// Owns the registry, the matcher and the per-connection outboxes. Every
/// method is one indivisible step; callers serialize access (the server
/// keeps the coordinator behind a single mutex).
pub struct Coordinator {
    registry: Registry,
    matcher: Box<dyn Matcher>,
    connections: HashMap<PeerId, Outbox>,
}

impl Coordinator {
    pub fn new(matcher: Box<dyn Matcher>) -> Self {
        Self {
            registry: Registry::new(),
            matcher,
            connections: HashMap::new(),
        }
    }

    pub fn with_policy(policy: MatchPolicy, requeue_orphans: bool) -> Self {
        Self::new(build_matcher(policy, requeue_orphans))
    }

    pub fn policy(&self) -> MatchPolicy {
        self.matcher.policy()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn matcher(&self) -> &dyn Matcher {
        self.matcher.as_ref()
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            policy: self.policy(),
            participants: self.registry.len(),
            joined: self.registry.list_joined().len(),
            waiting: self.matcher.waiting().cloned(),
        }
    }

    /// Transport connect: allocate an identity, register it and greet the client.
    pub fn connect(&mut self, outbox: Outbox) -> PeerId {
        let id = PeerId::generate();
        self.connect_with_id(id.clone(), outbox);
        id
    }

    pub fn connect_with_id(&mut self, id: PeerId, outbox: Outbox) -> Participant {
        let participant = self.registry.register(id.clone());
        let welcome = ServerMessage::Welcome {
            peer_id: id.clone(),
            policy: self.policy(),
        };
        self.connections.insert(id.clone(), outbox);
        self.deliver(&id, welcome);
        participant
    }

    /// Apply one client message from connection `id`.
    pub fn handle(&mut self, id: &PeerId, message: ClientMessage) -> Result<Outcome, SignalError> {
        match message {
            ClientMessage::Join { display_name } => {
                self.join(id, &display_name)?;
                Ok(Outcome::Joined)
            }
            ClientMessage::Offer { to, offer } => {
                self.relay(id, MessageKind::Offer, to.as_ref(), offer)
            }
            ClientMessage::Answer { to, answer } => {
                self.relay(id, MessageKind::Answer, to.as_ref(), answer)
            }
            ClientMessage::IceCandidate { to, candidate } => {
                self.relay(id, MessageKind::IceCandidate, to.as_ref(), candidate)
            }
            ClientMessage::Ping => {
                self.deliver(id, ServerMessage::Pong);
                Ok(Outcome::Pong)
            }
        }
    }

    pub fn join(&mut self, id: &PeerId, display_name: &str) -> Result<Participant, SignalError> {
        let participant = self.registry.join(id, display_name)?;
        let notices = self.matcher.on_join(&self.registry, &participant);
        info!(
            peer_id = %id,
            display_name = %participant.display_name,
            notices = notices.len(),
            "join handled"
        );
        for notice in notices {
            let (to, message) = notice.into_message();
            self.deliver(&to, message);
        }
        Ok(participant)
    }

    fn relay(
        &mut self,
        source: &PeerId,
        kind: MessageKind,
        target: Option<&PeerId>,
        payload: serde_json::Value,
    ) -> Result<Outcome, SignalError> {
        let delivery = relay::forward(&self.registry, kind, source, target, payload)?;
        if !self.deliver(&delivery.to, delivery.message) {
            return Err(SignalError::UnknownTarget(delivery.to));
        }
        Ok(Outcome::Relayed(kind))
    }

    /// Transport disconnect: evict the participant and notify whoever the
    /// matcher says is affected, all in this call.
    pub fn disconnect(&mut self, id: &PeerId) -> Option<Participant> {
        self.connections.remove(id);
        let removed = self.registry.remove(id)?;
        let notices = self.matcher.on_leave(&self.registry, id);
        info!(peer_id = %id, notices = notices.len(), "participant left");
        for notice in notices {
            let (to, message) = notice.into_message();
            self.deliver(&to, message);
        }
        Some(removed)
    }

    fn deliver(&self, to: &PeerId, message: ServerMessage) -> bool {
        match self.connections.get(to) {
            Some(outbox) => {
                if outbox.send(message).is_err() {
                    warn!(peer_id = %to, "outbox closed; message dropped");
                    false
                } else {
                    true
                }
            }
            None => {
                debug!(peer_id = %to, "no outbox for participant");
                false
            }
        }
    }
}
