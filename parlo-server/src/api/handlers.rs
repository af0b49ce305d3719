//! HTTP request handlers
//!
//! Implements the session control endpoints. Error mapping: a rejected start
//! while a session is running answers 409; stage initialization failures
//! answer 502 with the controller reverted to idle; stop always succeeds.

use crate::api::AppContext;
use crate::error::Error;
use axum::{extract::State, http::StatusCode, Json};
use parlo_common::events::SessionState;
use parlo_common::types::TranscriptEntry;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub session_id: Uuid,
    pub stream_path: String,
    pub state: SessionState,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub state: SessionState,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_connected: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub entries: Vec<TranscriptEntry>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Session Control Endpoints
// ============================================================================

/// POST /session/start - Begin a translation session
pub async fn start_session(
    State(ctx): State<AppContext>,
) -> Result<Json<StartResponse>, (StatusCode, Json<ErrorResponse>)> {
    match ctx.controller.clone().start().await {
        Ok(info) => {
            info!("session {} started via API", info.session_id);
            Ok(Json(StartResponse {
                session_id: info.session_id,
                stream_path: info.stream_path,
                state: ctx.controller.state(),
            }))
        }
        Err(Error::AlreadyRunning) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: Error::AlreadyRunning.to_string(),
            }),
        )),
        Err(e @ Error::ProviderInit(_)) => {
            error!("session start failed: {e}");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
        Err(e) => {
            error!("session start failed: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

/// POST /session/stop - End the active session (idempotent, always succeeds)
pub async fn stop_session(State(ctx): State<AppContext>) -> Json<StopResponse> {
    ctx.controller.stop().await;
    Json(StopResponse {
        state: ctx.controller.state(),
    })
}

/// GET /session/status - Current controller state, read-only
pub async fn get_status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    let snapshot = ctx.controller.status();
    Json(StatusResponse {
        state: snapshot.state,
        session_id: snapshot.session_id,
        uptime_ms: snapshot.uptime_ms,
        peer_connected: snapshot.peer_connected,
    })
}

/// GET /session/transcript - Transcript of the active (or last) session
pub async fn get_transcript(State(ctx): State<AppContext>) -> Json<TranscriptResponse> {
    Json(TranscriptResponse {
        entries: ctx.transcript.snapshot(),
    })
}
