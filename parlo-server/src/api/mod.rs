//! HTTP control surface
//!
//! Exposes the session controls consumed by the browser UI, the SSE event
//! stream, and the WebSocket audio channel, all on one listener.

pub mod handlers;
pub mod sse;
pub mod stream;

use crate::config::Config;
use crate::session::{SessionController, TranscriptLog};
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use parlo_common::events::EventBus;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub controller: Arc<SessionController>,
    pub bus: Arc<EventBus>,
    pub transcript: Arc<TranscriptLog>,
    pub config: Arc<Config>,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Session control
        .route("/session/start", post(handlers::start_session))
        .route("/session/stop", post(handlers::stop_session))
        .route("/session/status", get(handlers::get_status))
        .route("/session/transcript", get(handlers::get_transcript))
        // Streaming audio channel (one peer per session)
        .route("/session/:session_id/stream", get(stream::stream))
        // SSE events
        .route("/events", get(sse::event_stream))
        .with_state(ctx)
        // Enable CORS for the local browser UI
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// GET /health - Health check endpoint
async fn health_check(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "parlo-server",
        "version": env!("CARGO_PKG_VERSION"),
        "state": ctx.controller.state(),
        "languages": {
            "source": ctx.config.languages.source,
            "target": ctx.config.languages.target,
        }
    }))
}
