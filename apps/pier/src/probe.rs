//! Debug client: joins a server as an ordinary participant and runs the
//! negotiation state machine against a loopback media session.

use anyhow::{anyhow, Result};
use futures_util::{SinkExt, StreamExt};
use pier_core::{
    ClientMessage, LinkState, LinkTable, MediaError, MediaSession, PeerId, ServerMessage,
};
use serde_json::{json, Value};
use tokio::time::{timeout, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Fabricates opaque descriptions so negotiation can be exercised without a
/// real media stack.
#[derive(Debug)]
pub struct LoopbackMedia {
    label: String,
    remote: PeerId,
    version: u32,
    remote_description: Option<Value>,
    applied_candidates: usize,
}

impl LoopbackMedia {
    pub fn new(label: &str, remote: &PeerId) -> Self {
        Self {
            label: label.to_string(),
            remote: remote.clone(),
            version: 0,
            remote_description: None,
            applied_candidates: 0,
        }
    }

    fn description(&mut self, kind: &str) -> Value {
        self.version += 1;
        json!({
            "type": kind,
            "sdp": format!("v=0\r\no=pier-probe {} {} IN IP4 0.0.0.0\r\ns={}\r\n", self.version, self.version, self.label),
        })
    }

    pub fn applied_candidates(&self) -> usize {
        self.applied_candidates
    }
}

impl MediaSession for LoopbackMedia {
    fn create_offer(&mut self) -> Result<Value, MediaError> {
        Ok(self.description("offer"))
    }

    fn create_answer(&mut self) -> Result<Value, MediaError> {
        if self.remote_description.is_none() {
            return Err(MediaError("no remote offer to answer".into()));
        }
        Ok(self.description("answer"))
    }

    fn set_remote_description(&mut self, description: &Value) -> Result<(), MediaError> {
        let has_sdp = description
            .get("sdp")
            .and_then(Value::as_str)
            .is_some_and(|sdp| !sdp.is_empty());
        if !has_sdp {
            return Err(MediaError("description carries no sdp".into()));
        }
        self.remote_description = Some(description.clone());
        Ok(())
    }

    fn add_ice_candidate(&mut self, candidate: &Value) -> Result<(), MediaError> {
        debug!(peer_id = %self.remote, candidate = %candidate, "applied candidate");
        self.applied_candidates += 1;
        Ok(())
    }

    fn close(&mut self) {
        debug!(peer_id = %self.remote, "released loopback media");
    }
}

/// Candidates to trickle after a local offer or answer to `peer`.
fn synthetic_candidates(peer: &PeerId, count: usize) -> Vec<Value> {
    (0..count)
        .map(|n| {
            json!({
                "candidate": format!("candidate:{n} 1 udp 2122260223 192.0.2.{} 5{n:04} typ host", n + 1),
                "sdpMid": "0",
                "sdpMLineIndex": 0,
                "usernameFragment": peer.as_str().chars().take(8).collect::<String>(),
            })
        })
        .collect()
}

fn described_peer(message: &ClientMessage) -> Option<&PeerId> {
    match message {
        ClientMessage::Offer { to, .. } | ClientMessage::Answer { to, .. } => to.as_ref(),
        _ => None,
    }
}

pub async fn run_probe(url: String, name: String, timeout_secs: u64, candidates: usize) -> Result<()> {
    debug!("Connecting to {}", url);

    let (ws_stream, _) = match timeout(Duration::from_secs(5), connect_async(&url)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!("Failed to connect to {}: {}", url, e);
            return Err(anyhow!("Connection failed: {}", e));
        }
        Err(_) => {
            error!("Connection timeout after 5 seconds");
            return Err(anyhow!("Connection timeout - is the signaling server running?"));
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let join = ClientMessage::Join {
        display_name: name.clone(),
    };
    write
        .send(Message::Text(serde_json::to_string(&join)?.into()))
        .await?;

    let label = name.clone();
    let mut table = LinkTable::new(move |peer: &PeerId| LoopbackMedia::new(&label, peer));
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);

    let outcome = loop {
        let next = match tokio::time::timeout_at(deadline, read.next()).await {
            Ok(next) => next,
            Err(_) => break Err(anyhow!("no link connected within {} seconds", timeout_secs)),
        };
        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => break Err(e.into()),
            None => break Err(anyhow!("Connection closed by server")),
        };
        let Message::Text(text) = frame else {
            continue;
        };
        let message: ServerMessage = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring undecodable server message: {}", e);
                continue;
            }
        };
        info!("<- {:?}", message);

        let outgoing = match table.handle(message) {
            Ok(outgoing) => outgoing,
            Err(e) => {
                warn!("Negotiation error: {}", e);
                continue;
            }
        };
        for message in outgoing {
            let trickle_to = described_peer(&message).cloned();
            info!("-> {:?}", message);
            write
                .send(Message::Text(serde_json::to_string(&message)?.into()))
                .await?;

            let Some(peer) = trickle_to else { continue };
            let Some(link) = table.link(&peer) else { continue };
            for candidate in synthetic_candidates(&peer, candidates) {
                let trickle = link.local_candidate(candidate)?;
                write
                    .send(Message::Text(serde_json::to_string(&trickle)?.into()))
                    .await?;
            }
        }

        if let Some(link) = table.links().find(|l| l.state() == LinkState::Connected) {
            info!(
                "Link to {} connected as {:?} ({} remote candidates applied so far)",
                link.remote(),
                link.role(),
                link.media().applied_candidates()
            );
            break Ok(());
        }
    };

    table.close_all();
    let _ = write.send(Message::Close(None)).await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_refuses_answer_without_offer() {
        let mut media = LoopbackMedia::new("probe", &PeerId::from("peer"));
        assert!(media.create_answer().is_err());
        assert!(media.set_remote_description(&json!({"type": "offer"})).is_err());
        let offer = media.create_offer().unwrap();
        media.set_remote_description(&offer).unwrap();
        assert!(media.create_answer().is_ok());
    }

    #[test]
    fn synthetic_candidates_are_distinct() {
        let list = synthetic_candidates(&PeerId::from("abcdefghijkl"), 3);
        assert_eq!(list.len(), 3);
        assert_ne!(list[0], list[1]);
        assert_eq!(list[2]["usernameFragment"], "abcdefgh");
    }
}
