pub mod cli;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod probe;
pub mod telemetry;
pub mod websocket;

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::handlers::{health_check, metrics_handler};
use crate::websocket::{websocket_handler, SignalingState};

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid allowed origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true)
}

pub fn router(state: SignalingState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(websocket_handler))
        .with_state(state)
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// Run the signaling server on an already bound listener until `shutdown`
/// resolves.
pub async fn serve<F>(listener: TcpListener, config: Config, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = SignalingState::new(config.policy, config.requeue_orphans);
    let app = router(state, &config);
    info!(
        addr = %listener.local_addr()?,
        policy = %config.policy,
        requeue_orphans = config.requeue_orphans,
        origins = ?config.allowed_origins,
        "pier signaling server listening"
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
