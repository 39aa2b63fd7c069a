use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Serialize;

use crate::metrics;
use crate::websocket::SignalingState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub policy: String,
    pub participants: usize,
    pub joined: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting: Option<String>,
}

pub async fn health_check(State(state): State<SignalingState>) -> Json<HealthResponse> {
    let stats = state.stats();
    Json(HealthResponse {
        status: "ok",
        policy: stats.policy.to_string(),
        participants: stats.participants,
        joined: stats.joined,
        waiting: stats.waiting.map(|id| id.to_string()),
    })
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather(),
    )
}
