use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Opaque identity of one live transport connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Generate a fresh identity for a newly accepted connection
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which side sends the first offer on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// The responder yields when both sides offer at once.
    pub fn is_polite(self) -> bool {
        matches!(self, Role::Responder)
    }
}

/// Matching policy the coordinator runs with. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    Pairwise,
    Room,
}

impl MatchPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchPolicy::Pairwise => "pairwise",
            MatchPolicy::Room => "room",
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pairwise" | "pair" => Ok(MatchPolicy::Pairwise),
            "room" => Ok(MatchPolicy::Room),
            other => Err(format!("unknown match policy '{other}'")),
        }
    }
}

/// Negotiation message kinds the relay is allowed to forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Offer,
    Answer,
    IceCandidate,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::IceCandidate => "ice_candidate",
        }
    }
}

/// Messages sent from client to the signaling server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Announce presence and enter the matcher
    Join {
        #[serde(default, alias = "nickname")]
        display_name: String,
    },
    Offer {
        #[serde(default, alias = "target_user", skip_serializing_if = "Option::is_none")]
        to: Option<PeerId>,
        #[serde(default)]
        offer: Value,
    },
    Answer {
        #[serde(default, alias = "target_user", skip_serializing_if = "Option::is_none")]
        to: Option<PeerId>,
        #[serde(default)]
        answer: Value,
    },
    IceCandidate {
        #[serde(default, alias = "target_user", skip_serializing_if = "Option::is_none")]
        to: Option<PeerId>,
        #[serde(default)]
        candidate: Value,
    },
    /// Heartbeat to keep connection alive
    Ping,
}

impl ClientMessage {
    /// Build the outbound form of a negotiation message.
    pub fn negotiation(kind: MessageKind, to: PeerId, payload: Value) -> Self {
        let to = Some(to);
        match kind {
            MessageKind::Offer => ClientMessage::Offer { to, offer: payload },
            MessageKind::Answer => ClientMessage::Answer {
                to,
                answer: payload,
            },
            MessageKind::IceCandidate => ClientMessage::IceCandidate {
                to,
                candidate: payload,
            },
        }
    }
}

/// Messages sent from the signaling server to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Identity assigned to this connection
    Welcome { peer_id: PeerId, policy: MatchPolicy },
    /// Pairwise match found
    Paired { peer_id: PeerId, role: Role },
    /// New member entered the room
    PeerJoined { peer_id: PeerId, display_name: String },
    /// Current room membership, sent to a newcomer
    RoomMembers { members: Vec<MemberInfo> },
    /// Counterpart or room member went away
    PeerLeft { peer_id: PeerId },
    Offer { from: PeerId, offer: Value },
    Answer { from: PeerId, answer: Value },
    IceCandidate { from: PeerId, candidate: Value },
    /// Response to ping
    Pong,
    /// Message was rejected; the connection stays open
    Error { code: String, message: String },
}

impl ServerMessage {
    /// Build the relayed form of a negotiation message.
    pub fn negotiation(kind: MessageKind, from: PeerId, payload: Value) -> Self {
        match kind {
            MessageKind::Offer => ServerMessage::Offer {
                from,
                offer: payload,
            },
            MessageKind::Answer => ServerMessage::Answer {
                from,
                answer: payload,
            },
            MessageKind::IceCandidate => ServerMessage::IceCandidate {
                from,
                candidate: payload,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub peer_id: PeerId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_accepts_nickname_alias() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "join", "nickname": "ada"})).unwrap();
        match msg {
            ClientMessage::Join { display_name } => assert_eq!(display_name, "ada"),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn offer_without_target_decodes_with_empty_target() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "offer", "offer": {"sdp": "v=0"}})).unwrap();
        match msg {
            ClientMessage::Offer { to, offer } => {
                assert!(to.is_none());
                assert_eq!(offer, json!({"sdp": "v=0"}));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn target_user_alias_is_accepted() {
        let msg: ClientMessage = serde_json::from_value(
            json!({"type": "ice_candidate", "target_user": "abc", "candidate": "c1"}),
        )
        .unwrap();
        match msg {
            ClientMessage::IceCandidate { to, .. } => assert_eq!(to, Some(PeerId::from("abc"))),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn server_messages_use_snake_case_tags() {
        let value = serde_json::to_value(ServerMessage::Paired {
            peer_id: PeerId::from("p1"),
            role: Role::Initiator,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"type": "paired", "peer_id": "p1", "role": "initiator"})
        );

        let value = serde_json::to_value(ServerMessage::negotiation(
            MessageKind::IceCandidate,
            PeerId::from("p2"),
            json!("cand"),
        ))
        .unwrap();
        assert_eq!(
            value,
            json!({"type": "ice_candidate", "from": "p2", "candidate": "cand"})
        );
    }

    #[test]
    fn match_policy_parses_case_insensitively() {
        assert_eq!("Room".parse::<MatchPolicy>(), Ok(MatchPolicy::Room));
        assert_eq!("pairwise".parse::<MatchPolicy>(), Ok(MatchPolicy::Pairwise));
        assert!("mesh".parse::<MatchPolicy>().is_err());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = PeerId::generate();
        let b = PeerId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }
}
