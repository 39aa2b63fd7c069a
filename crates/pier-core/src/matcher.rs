use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::protocol::{MatchPolicy, MemberInfo, PeerId, Role, ServerMessage};
use crate::registry::{Participant, Registry};

/// A notification the matcher wants delivered to one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Paired {
        to: PeerId,
        peer: PeerId,
        role: Role,
    },
    PeerJoined {
        to: PeerId,
        peer: PeerId,
        display_name: String,
    },
    Members {
        to: PeerId,
        members: Vec<MemberInfo>,
    },
    PeerLeft {
        to: PeerId,
        peer: PeerId,
    },
}

impl Notice {
    pub fn recipient(&self) -> &PeerId {
        match self {
            Notice::Paired { to, .. }
            | Notice::PeerJoined { to, .. }
            | Notice::Members { to, .. }
            | Notice::PeerLeft { to, .. } => to,
        }
    }

    pub fn into_message(self) -> (PeerId, ServerMessage) {
        match self {
            Notice::Paired { to, peer, role } => (to, ServerMessage::Paired { peer_id: peer, role }),
            Notice::PeerJoined {
                to,
                peer,
                display_name,
            } => (
                to,
                ServerMessage::PeerJoined {
                    peer_id: peer,
                    display_name,
                },
            ),
            Notice::Members { to, members } => (to, ServerMessage::RoomMembers { members }),
            Notice::PeerLeft { to, peer } => (to, ServerMessage::PeerLeft { peer_id: peer }),
        }
    }
}

/// Grouping policy. Implementations own their waiting slot / room set and
/// are only mutated from join and leave events.
pub trait Matcher: Send {
    fn policy(&self) -> MatchPolicy;

    /// `joined` has just transitioned to joined in `registry`.
    fn on_join(&mut self, registry: &Registry, joined: &Participant) -> Vec<Notice>;

    /// `left` has already been evicted from `registry`.
    fn on_leave(&mut self, registry: &Registry, left: &PeerId) -> Vec<Notice>;

    /// Participant currently waiting for a partner, if the policy has one.
    fn waiting(&self) -> Option<&PeerId> {
        None
    }
}

pub fn build_matcher(policy: MatchPolicy, requeue_orphans: bool) -> Box<dyn Matcher> {
    match policy {
        MatchPolicy::Pairwise => Box::new(PairwiseMatcher::new(requeue_orphans)),
        MatchPolicy::Room => Box::new(RoomMatcher::new()),
    }
}

/// Exclusive one-to-one matching with a single waiting slot.
#[derive(Debug, Default)]
pub struct PairwiseMatcher {
    waiting: Option<PeerId>,
    partners: HashMap<PeerId, PeerId>,
    requeue_orphans: bool,
}

impl PairwiseMatcher {
    pub fn new(requeue_orphans: bool) -> Self {
        Self {
            requeue_orphans,
            ..Self::default()
        }
    }

    pub fn counterpart(&self, id: &PeerId) -> Option<&PeerId> {
        self.partners.get(id)
    }

    /// Pair `newcomer` with the waiter or park it in the slot.
    fn enqueue(&mut self, registry: &Registry, newcomer: PeerId) -> Vec<Notice> {
        let waiter = self.waiting.take().filter(|w| registry.is_joined(w));
        match waiter {
            Some(waiter) if waiter != newcomer => {
                info!(initiator = %waiter, responder = %newcomer, "paired participants");
                self.partners.insert(waiter.clone(), newcomer.clone());
                self.partners.insert(newcomer.clone(), waiter.clone());
                vec![
                    Notice::Paired {
                        to: waiter.clone(),
                        peer: newcomer.clone(),
                        role: Role::Initiator,
                    },
                    Notice::Paired {
                        to: newcomer,
                        peer: waiter,
                        role: Role::Responder,
                    },
                ]
            }
            _ => {
                debug!(peer_id = %newcomer, "no waiting participant; queued");
                self.waiting = Some(newcomer);
                Vec::new()
            }
        }
    }
}

impl Matcher for PairwiseMatcher {
    fn policy(&self) -> MatchPolicy {
        MatchPolicy::Pairwise
    }

    fn on_join(&mut self, registry: &Registry, joined: &Participant) -> Vec<Notice> {
        self.enqueue(registry, joined.id.clone())
    }

    fn on_leave(&mut self, registry: &Registry, left: &PeerId) -> Vec<Notice> {
        if self.waiting.as_ref() == Some(left) {
            debug!(peer_id = %left, "removing waiting participant from queue");
            self.waiting = None;
            return Vec::new();
        }
        let Some(partner) = self.partners.remove(left) else {
            return Vec::new();
        };
        self.partners.remove(&partner);

        let mut notices = vec![Notice::PeerLeft {
            to: partner.clone(),
            peer: left.clone(),
        }];
        if self.requeue_orphans && registry.is_joined(&partner) {
            debug!(peer_id = %partner, "re-queueing orphaned participant");
            notices.extend(self.enqueue(registry, partner));
        }
        notices
    }

    fn waiting(&self) -> Option<&PeerId> {
        self.waiting.as_ref()
    }
}

/// Single open room; every member negotiates with every other member.
#[derive(Debug, Default)]
pub struct RoomMatcher {
    members: HashSet<PeerId>,
}

impl RoomMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self) -> impl Iterator<Item = &PeerId> {
        self.members.iter()
    }
}

impl Matcher for RoomMatcher {
    fn policy(&self) -> MatchPolicy {
        MatchPolicy::Room
    }

    fn on_join(&mut self, registry: &Registry, joined: &Participant) -> Vec<Notice> {
        if self.members.contains(&joined.id) {
            return Vec::new();
        }

        let mut existing: Vec<MemberInfo> = self
            .members
            .iter()
            .filter_map(|id| registry.lookup(id))
            .map(Participant::member_info)
            .collect();
        existing.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.peer_id.cmp(&b.peer_id))
        });

        let mut notices: Vec<Notice> = existing
            .iter()
            .map(|member| Notice::PeerJoined {
                to: member.peer_id.clone(),
                peer: joined.id.clone(),
                display_name: joined.display_name.clone(),
            })
            .collect();
        info!(
            peer_id = %joined.id,
            existing = existing.len(),
            "participant entered room"
        );
        notices.push(Notice::Members {
            to: joined.id.clone(),
            members: existing,
        });

        self.members.insert(joined.id.clone());
        notices
    }

    fn on_leave(&mut self, _registry: &Registry, left: &PeerId) -> Vec<Notice> {
        if !self.members.remove(left) {
            return Vec::new();
        }
        self.members
            .iter()
            .map(|member| Notice::PeerLeft {
                to: member.clone(),
                peer: left.clone(),
            })
            .collect()
    }
}
