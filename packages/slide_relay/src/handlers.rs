use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

use crate::config::{HeartbeatConfig, RelayConfig};
use crate::gateway::ConnectionGateway;
use crate::id::ShortIdGenerator;
use crate::metrics::{MetricsSnapshot, RelayMetrics};
use crate::public_url::PublicUrl;
use crate::registry::SessionRegistry;
use crate::relay::CommandRelay;
use crate::session_actor::SessionSnapshot;
use crate::ws;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<CommandRelay>,
    pub metrics: Arc<RelayMetrics>,
    pub heartbeat: HeartbeatConfig,
    /// Cancelled on server shutdown; open sockets watch it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire up gateway, registry and relay from runtime config.
    pub fn new(config: &RelayConfig, shutdown: CancellationToken) -> Self {
        let metrics = Arc::new(RelayMetrics::new());
        let gateway = Arc::new(ConnectionGateway::new(
            config.relay.send_channel_capacity,
            metrics.clone(),
        ));
        let registry = Arc::new(SessionRegistry::new(
            Box::new(ShortIdGenerator::new(config.relay.id_length)),
            config.relay.max_id_attempts,
            gateway.clone(),
        ));
        let public_url = PublicUrl::resolve(&config.public_url, config.server.port);
        let relay = Arc::new(CommandRelay::new(
            registry,
            gateway,
            public_url,
            metrics.clone(),
        ));

        Self {
            relay,
            metrics,
            heartbeat: config.heartbeat.clone(),
            shutdown,
        }
    }
}

/// Tags each HTTP request span with a fresh id.
#[derive(Clone, Copy)]
pub struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/health", get(health_handler))
        .route("/health/live", get(health_live_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// WebSocket upgrade for hosts and remotes alike
pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let relay = state.relay.clone();
    let metrics = state.metrics.clone();
    let heartbeat = state.heartbeat.clone();
    let shutdown = state.shutdown.clone();

    ws.on_upgrade(move |socket| ws::handle_relay_ws(socket, relay, metrics, heartbeat, shutdown))
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Health check endpoint, shaped the way the web frontend polls it
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthStatus {
        status: "ok",
        timestamp: Utc::now(),
    })
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    pub live_sessions: usize,
    pub registered_connections: usize,
    pub presentations: Vec<SessionSnapshot>,
}

/// Metrics endpoint - counters plus a view of every live presentation
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let presentations = state.relay.registry().snapshots().await;
    Json(MetricsResponse {
        metrics: state.metrics.snapshot(),
        live_sessions: presentations.len(),
        registered_connections: state.relay.gateway().connection_count().await,
        presentations,
    })
}
