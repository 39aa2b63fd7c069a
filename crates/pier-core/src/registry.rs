use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::error::SignalError;
use crate::protocol::{MemberInfo, PeerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    Unregistered,
    Joined,
    Left,
}

/// One live transport connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub id: PeerId,
    pub display_name: String,
    pub state: MembershipState,
    /// Unix seconds of the successful join
    pub joined_at: Option<i64>,
}

impl Participant {
    pub fn is_joined(&self) -> bool {
        self.state == MembershipState::Joined
    }

    pub fn member_info(&self) -> MemberInfo {
        MemberInfo {
            peer_id: self.id.clone(),
            display_name: self.display_name.clone(),
            joined_at: self.joined_at,
        }
    }
}

/// Maps connection ids to participants. Entries live exactly as long as the
/// transport connection does.
#[derive(Debug, Default)]
pub struct Registry {
    participants: HashMap<PeerId, Participant>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly connected transport. Re-registering a live id keeps
    /// the existing entry untouched.
    pub fn register(&mut self, id: PeerId) -> Participant {
        self.participants
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(peer_id = %id, "registered connection");
                Participant {
                    id,
                    display_name: String::new(),
                    state: MembershipState::Unregistered,
                    joined_at: None,
                }
            })
            .clone()
    }

    pub fn join(&mut self, id: &PeerId, display_name: &str) -> Result<Participant, SignalError> {
        let participant = self
            .participants
            .get_mut(id)
            .ok_or_else(|| SignalError::UnknownConnection(id.clone()))?;
        if participant.state == MembershipState::Joined {
            return Err(SignalError::AlreadyJoined(id.clone()));
        }
        participant.display_name = display_name.to_string();
        participant.state = MembershipState::Joined;
        participant.joined_at = Some(chrono::Utc::now().timestamp());
        debug!(peer_id = %id, display_name = %participant.display_name, "participant joined");
        Ok(participant.clone())
    }

    pub fn lookup(&self, id: &PeerId) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn is_joined(&self, id: &PeerId) -> bool {
        self.lookup(id).is_some_and(Participant::is_joined)
    }

    /// Evict a participant. Returns the final snapshot (state `Left`) the
    /// first time and `None` afterwards.
    pub fn remove(&mut self, id: &PeerId) -> Option<Participant> {
        let mut participant = self.participants.remove(id)?;
        participant.state = MembershipState::Left;
        debug!(peer_id = %id, "participant removed");
        Some(participant)
    }

    pub fn list_joined(&self) -> Vec<Participant> {
        self.participants
            .values()
            .filter(|p| p.is_joined())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_requires_registration() {
        let mut registry = Registry::new();
        let ghost = PeerId::from("ghost");
        assert_eq!(
            registry.join(&ghost, "nobody"),
            Err(SignalError::UnknownConnection(ghost))
        );
    }

    #[test]
    fn join_transitions_once() {
        let mut registry = Registry::new();
        let id = PeerId::from("a");
        let created = registry.register(id.clone());
        assert_eq!(created.state, MembershipState::Unregistered);
        assert!(created.display_name.is_empty());

        let joined = registry.join(&id, " alice ").unwrap();
        assert_eq!(joined.state, MembershipState::Joined);
        assert_eq!(joined.display_name, " alice ");
        assert!(joined.joined_at.is_some());

        assert_eq!(
            registry.join(&id, "again"),
            Err(SignalError::AlreadyJoined(id.clone()))
        );
        assert_eq!(registry.lookup(&id).unwrap().display_name, " alice ");
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = Registry::new();
        let id = PeerId::from("a");
        registry.register(id.clone());
        registry.join(&id, "alice").unwrap();

        let removed = registry.remove(&id).unwrap();
        assert_eq!(removed.state, MembershipState::Left);
        assert!(registry.lookup(&id).is_none());
        assert!(registry.remove(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn list_joined_skips_unregistered() {
        let mut registry = Registry::new();
        for name in ["a", "b", "c"] {
            registry.register(PeerId::from(name));
        }
        registry.join(&PeerId::from("b"), "bob").unwrap();

        let joined = registry.list_joined();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].id, PeerId::from("b"));
        assert_eq!(registry.len(), 3);
    }
}
