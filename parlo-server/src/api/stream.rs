//! WebSocket audio channel endpoint
//!
//! Bridges the one streaming peer of a session onto the pipeline's bounded
//! queues. The socket is split so inbound audio and outbound synthesis run
//! as independent units: the reader forwards client frames into the pipeline
//! (suspending on a full queue, so the peer rather than the server buffers),
//! the writer drains synthesized frames back out. Either half ending means
//! the peer is gone, which is reported into the pipeline's fault path.

use crate::api::handlers::ErrorResponse;
use crate::api::AppContext;
use crate::pipeline::channel::{decode_pcm, encode_pcm, PeerEndpoints};
use crate::pipeline::orchestrator::PipelineFault;
use crate::session::PendingPeer;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use parlo_common::events::{EventBus, ParloEvent};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// GET /session/:session_id/stream - upgrade to the audio channel
pub async fn stream(
    ws: WebSocketUpgrade,
    Path(session_id): Path<Uuid>,
    State(ctx): State<AppContext>,
) -> Response {
    match ctx.controller.claim_peer(session_id) {
        Ok(peer) => {
            let bus = ctx.bus.clone();
            ws.on_upgrade(move |socket| pump(socket, peer, bus))
        }
        Err(e) => {
            warn!("rejected stream connection for {session_id}: {e}");
            (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn pump(socket: WebSocket, peer: PendingPeer, bus: Arc<EventBus>) {
    let PendingPeer {
        session_id,
        endpoints,
        fault_tx,
        peer_connected,
        sample_rate,
        channels,
    } = peer;
    let PeerEndpoints {
        frames_tx,
        mut audio_rx,
    } = endpoints;

    peer_connected.store(true, Ordering::Relaxed);
    bus.emit_lossy(ParloEvent::PeerConnected {
        session_id,
        timestamp: chrono::Utc::now(),
    });
    info!(%session_id, "streaming peer connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Reader: client audio into the pipeline, in arrival order. Dropping
    // frames_tx on exit is what ends the pipeline's input sequence.
    let mut reader = tokio::spawn(async move {
        while let Some(message) = ws_rx.next().await {
            match message {
                Ok(Message::Binary(bytes)) => {
                    let timestamp_ms = chrono::Utc::now().timestamp_millis() as u64;
                    let frame = decode_pcm(&bytes, sample_rate, channels, timestamp_ms);
                    if frames_tx.send(frame).await.is_err() {
                        break; // pipeline gone
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {} // text/ping/pong: not part of the framing
                Err(e) => {
                    debug!("websocket receive error: {e}");
                    break;
                }
            }
        }
    });

    // Writer: synthesized audio back to the client.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = audio_rx.recv().await {
            if ws_tx
                .send(Message::Binary(encode_pcm(&frame)))
                .await
                .is_err()
            {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    // Either half ending means the connection is done.
    tokio::select! {
        _ = &mut reader => writer.abort(),
        _ = &mut writer => reader.abort(),
    }

    peer_connected.store(false, Ordering::Relaxed);
    bus.emit_lossy(ParloEvent::PeerDisconnected {
        session_id,
        timestamp: chrono::Utc::now(),
    });
    info!(%session_id, "streaming peer disconnected");

    // Route the disconnect into the same path as stage faults so the
    // controller tears the session down.
    let _ = fault_tx.send(PipelineFault::PeerDisconnected);
}
