use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pier_core::{
    ClientMessage, Coordinator, CoordinatorStats, MatchPolicy, Outcome, PeerId, ServerMessage,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::metrics;

/// Shared signaling state. The coordinator sits behind one mutex so each
/// transport event is applied as a single step; nothing awaits while the
/// lock is held.
#[derive(Clone)]
pub struct SignalingState {
    coordinator: Arc<Mutex<Coordinator>>,
}

impl SignalingState {
    pub fn new(policy: MatchPolicy, requeue_orphans: bool) -> Self {
        Self {
            coordinator: Arc::new(Mutex::new(Coordinator::with_policy(
                policy,
                requeue_orphans,
            ))),
        }
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.coordinator.lock().stats()
    }

    fn connect(&self, tx: mpsc::UnboundedSender<ServerMessage>) -> PeerId {
        self.coordinator.lock().connect(tx)
    }

    fn disconnect(&self, peer_id: &PeerId) {
        self.coordinator.lock().disconnect(peer_id);
    }

    /// Decode and apply one text payload from `peer_id`. Rejections are
    /// reported back to the sender only.
    fn handle_text(
        &self,
        peer_id: &PeerId,
        text: &str,
        tx: &mpsc::UnboundedSender<ServerMessage>,
    ) {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer_id = %peer_id, error = %e, "failed to parse client message");
                metrics::SIGNAL_ERRORS
                    .with_label_values(&["invalid_message"])
                    .inc();
                let _ = tx.send(ServerMessage::Error {
                    code: "invalid_message".to_string(),
                    message: format!("Invalid message format: {}", e),
                });
                return;
            }
        };

        let result = self.coordinator.lock().handle(peer_id, message);
        match result {
            Ok(Outcome::Joined) => metrics::JOINS.inc(),
            Ok(Outcome::Relayed(kind)) => {
                metrics::RELAYED.with_label_values(&[kind.as_str()]).inc()
            }
            Ok(Outcome::Pong) => {}
            Err(e) => {
                warn!(peer_id = %peer_id, code = e.code(), error = %e, "dropped client message");
                metrics::SIGNAL_ERRORS.with_label_values(&[e.code()]).inc();
                let _ = tx.send(ServerMessage::Error {
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
    State(signaling): State<SignalingState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, signaling, remote_addr))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: SignalingState, remote_addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending messages to this peer
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let peer_id = state.connect(tx.clone());
    metrics::CONNECTIONS.inc();
    metrics::LIVE_CONNECTIONS.inc();
    info!(peer_id = %peer_id, remote = %remote_addr, "websocket connected");

    let writer_peer = peer_id.clone();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!(peer_id = %writer_peer, error = %e, "failed to encode server message"),
            }
        }
        let _ = sender.close().await;
        debug!(peer_id = %writer_peer, "message sender task ended");
    });

    while let Some(msg_result) = receiver.next().await {
        let msg = match msg_result {
            Ok(m) => m,
            Err(e) => {
                warn!(peer_id = %peer_id, error = %e, "websocket error");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                debug!(peer_id = %peer_id, bytes = text.len(), "text frame");
                state.handle_text(&peer_id, &text, &tx);
            }
            Message::Binary(data) => match String::from_utf8(data) {
                Ok(text) => state.handle_text(&peer_id, &text, &tx),
                Err(_) => {
                    debug!(peer_id = %peer_id, "ignoring non-UTF8 binary frame");
                }
            },
            Message::Close(_) => {
                debug!(peer_id = %peer_id, "received close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Same teardown path for graceful close and transport errors.
    state.disconnect(&peer_id);
    drop(tx);
    metrics::LIVE_CONNECTIONS.dec();
    info!(peer_id = %peer_id, remote = %remote_addr, "websocket disconnected");
}
