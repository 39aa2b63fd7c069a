use thiserror::Error;

use crate::protocol::PeerId;

/// Recoverable signaling failures. None of these close the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("participant {0} has already joined")]
    AlreadyJoined(PeerId),
    #[error("connection {0} was never registered")]
    UnknownConnection(PeerId),
    #[error("message has no target")]
    InvalidTarget,
    #[error("participant {0} cannot address a message to itself")]
    SelfAddressed(PeerId),
    #[error("target {0} is not a joined participant")]
    UnknownTarget(PeerId),
    #[error("malformed negotiation payload: {0}")]
    MalformedNegotiationPayload(String),
}

impl SignalError {
    /// Stable identifier sent to clients in `error` messages.
    pub fn code(&self) -> &'static str {
        match self {
            SignalError::AlreadyJoined(_) => "already_joined",
            SignalError::UnknownConnection(_) => "unknown_connection",
            SignalError::InvalidTarget => "invalid_target",
            SignalError::SelfAddressed(_) => "self_addressed",
            SignalError::UnknownTarget(_) => "unknown_target",
            SignalError::MalformedNegotiationPayload(_) => "malformed_negotiation_payload",
        }
    }
}
