//! Routing of negotiation messages between two joined participants.
//!
//! The relay only looks at routing fields. Payloads are forwarded exactly as
//! received and are never parsed here.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SignalError;
use crate::protocol::{MessageKind, PeerId, ServerMessage};
use crate::registry::Registry;

/// A validated, single-target delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: PeerId,
    pub message: ServerMessage,
}

/// Validate a negotiation message and address it to its target.
pub fn forward(
    registry: &Registry,
    kind: MessageKind,
    source: &PeerId,
    target: Option<&PeerId>,
    payload: Value,
) -> Result<Delivery, SignalError> {
    let target = match target {
        Some(target) if !target.as_str().trim().is_empty() => target,
        _ => {
            warn!(from = %source, kind = kind.as_str(), "dropping message without target");
            return Err(SignalError::InvalidTarget);
        }
    };
    if target == source {
        warn!(from = %source, kind = kind.as_str(), "dropping self-addressed message");
        return Err(SignalError::SelfAddressed(source.clone()));
    }
    if !registry.is_joined(target) {
        warn!(from = %source, to = %target, kind = kind.as_str(), "dropping message for unknown target");
        return Err(SignalError::UnknownTarget(target.clone()));
    }
    if payload.is_null() {
        warn!(from = %source, to = %target, kind = kind.as_str(), "dropping message without payload");
        return Err(SignalError::MalformedNegotiationPayload(format!(
            "{} payload is missing",
            kind.as_str()
        )));
    }

    debug!(from = %source, to = %target, kind = kind.as_str(), "relaying negotiation message");
    Ok(Delivery {
        to: target.clone(),
        message: ServerMessage::negotiation(kind, source.clone(), payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry_with(ids: &[&str]) -> Registry {
        let mut registry = Registry::new();
        for id in ids {
            let id = PeerId::from(*id);
            registry.register(id.clone());
            registry.join(&id, "").unwrap();
        }
        registry
    }

    #[test]
    fn forwards_payload_verbatim() {
        let registry = registry_with(&["a", "b"]);
        let payload = json!({"type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 0.0.0.0\r\n"});
        let delivery = forward(
            &registry,
            MessageKind::Offer,
            &PeerId::from("a"),
            Some(&PeerId::from("b")),
            payload.clone(),
        )
        .unwrap();
        assert_eq!(delivery.to, PeerId::from("b"));
        assert_eq!(
            delivery.message,
            ServerMessage::Offer {
                from: PeerId::from("a"),
                offer: payload,
            }
        );
    }

    #[test]
    fn rejects_missing_and_blank_targets() {
        let registry = registry_with(&["a"]);
        let source = PeerId::from("a");
        assert_eq!(
            forward(&registry, MessageKind::Answer, &source, None, json!("x")),
            Err(SignalError::InvalidTarget)
        );
        assert_eq!(
            forward(
                &registry,
                MessageKind::Answer,
                &source,
                Some(&PeerId::from("  ")),
                json!("x")
            ),
            Err(SignalError::InvalidTarget)
        );
    }

    #[test]
    fn rejects_self_addressed_for_every_kind() {
        let registry = registry_with(&["a"]);
        let me = PeerId::from("a");
        for kind in [
            MessageKind::Offer,
            MessageKind::Answer,
            MessageKind::IceCandidate,
        ] {
            assert_eq!(
                forward(&registry, kind, &me, Some(&me), json!({})),
                Err(SignalError::SelfAddressed(me.clone()))
            );
        }
    }

    #[test]
    fn rejects_unknown_and_unjoined_targets() {
        let mut registry = registry_with(&["a"]);
        let source = PeerId::from("a");
        let ghost = PeerId::from("ghost-id");
        assert_eq!(
            forward(&registry, MessageKind::Offer, &source, Some(&ghost), json!({})),
            Err(SignalError::UnknownTarget(ghost))
        );

        let lurker = PeerId::from("lurker");
        registry.register(lurker.clone());
        assert_eq!(
            forward(
                &registry,
                MessageKind::IceCandidate,
                &source,
                Some(&lurker),
                json!("c")
            ),
            Err(SignalError::UnknownTarget(lurker))
        );
    }

    #[test]
    fn source_need_not_have_joined() {
        let mut registry = registry_with(&["b"]);
        let newcomer = PeerId::from("newcomer");
        registry.register(newcomer.clone());
        let delivery = forward(
            &registry,
            MessageKind::IceCandidate,
            &newcomer,
            Some(&PeerId::from("b")),
            json!("c"),
        )
        .unwrap();
        assert_eq!(delivery.to, PeerId::from("b"));
    }

    #[test]
    fn rejects_null_payload_after_routing_checks() {
        let registry = registry_with(&["a", "b"]);
        let result = forward(
            &registry,
            MessageKind::Answer,
            &PeerId::from("a"),
            Some(&PeerId::from("b")),
            Value::Null,
        );
        assert!(matches!(
            result,
            Err(SignalError::MalformedNegotiationPayload(_))
        ));
    }
}
