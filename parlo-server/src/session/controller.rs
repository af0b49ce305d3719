//! Session controller
//!
//! Process-level state machine owning at most one active translation session:
//! `idle → starting → active → stopping → idle`, with a terminal `failed`
//! state recoverable only through an explicit stop.
//!
//! All state transitions are serialized through one mutation point (the
//! `active` mutex); `status()` reads a lock-free-ish mirror and never waits
//! on a teardown in progress. The mutex is never held across a provider
//! call: `start()` reserves the `starting` state, releases the lock for
//! stage initialization, and re-checks before installing the session.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::channel::{audio_channel, PeerEndpoints};
use crate::pipeline::orchestrator::{self, PipelineFault, PipelineHandle, PipelineSettings};
use crate::providers::{RetryPolicy, StageFactory};
use chrono::{DateTime, Utc};
use parlo_common::events::{EndReason, EventBus, ParloEvent, SessionState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// What `start()` hands back to the control surface.
#[derive(Debug, Clone)]
pub struct StartInfo {
    pub session_id: Uuid,
    pub stream_path: String,
}

/// Read-only view for `status()`.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub state: SessionState,
    pub session_id: Option<Uuid>,
    pub uptime_ms: Option<u64>,
    pub peer_connected: Option<bool>,
}

/// Peer-side channel endpoints waiting for the one WebSocket connection of a
/// session. Taken exactly once; a second connection attempt finds the slot
/// empty and is rejected.
pub struct PendingPeer {
    pub session_id: Uuid,
    pub endpoints: PeerEndpoints,
    pub fault_tx: tokio::sync::mpsc::UnboundedSender<PipelineFault>,
    pub peer_connected: Arc<AtomicBool>,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone)]
struct SessionInfo {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    peer_connected: Arc<AtomicBool>,
}

struct ActiveSession {
    id: Uuid,
    handle: PipelineHandle,
}

pub struct SessionController {
    config: Arc<Config>,
    factory: Arc<dyn StageFactory>,
    bus: Arc<EventBus>,

    /// State mirror for non-blocking status reads
    state: StdRwLock<SessionState>,
    /// Single mutation point for the one-active-session invariant
    active: Mutex<Option<ActiveSession>>,
    session_info: StdRwLock<Option<SessionInfo>>,
    peer_slot: StdMutex<Option<PendingPeer>>,
}

impl SessionController {
    pub fn new(config: Arc<Config>, factory: Arc<dyn StageFactory>, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            factory,
            bus,
            state: StdRwLock::new(SessionState::Idle),
            active: Mutex::new(None),
            session_info: StdRwLock::new(None),
            peer_slot: StdMutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().expect("state lock")
    }

    fn set_state(&self, new_state: SessionState) {
        let old_state = {
            let mut guard = self.state.write().expect("state lock");
            let old = *guard;
            *guard = new_state;
            old
        };
        if old_state != new_state {
            info!("session state: {old_state} -> {new_state}");
            self.bus.emit_lossy(ParloEvent::SessionStateChanged {
                old_state,
                new_state,
                timestamp: Utc::now(),
            });
        }
    }

    /// Start a new session. Valid only from idle; exactly one of any number
    /// of concurrent callers succeeds, the rest get `AlreadyRunning`.
    pub async fn start(self: Arc<Self>) -> Result<StartInfo> {
        // Fast path: don't queue on the mutation lock just to be refused.
        if self.state() != SessionState::Idle {
            return Err(Error::AlreadyRunning);
        }

        {
            let active = self.active.lock().await;
            if self.state() != SessionState::Idle || active.is_some() {
                return Err(Error::AlreadyRunning);
            }
            // Reserve the slot; the lock is released before any provider
            // call happens.
            self.set_state(SessionState::Starting);
        }

        let session_id = Uuid::new_v4();
        match Self::spawn_session(&self, session_id).await {
            Ok(info) => Ok(info),
            Err(e) => {
                warn!("session start failed: {e}");
                // Revert unless a concurrent stop() already reset us.
                let _active = self.active.lock().await;
                if self.state() == SessionState::Starting {
                    self.set_state(SessionState::Idle);
                }
                Err(e)
            }
        }
    }

    async fn spawn_session(this: &Arc<Self>, session_id: Uuid) -> Result<StartInfo> {
        let config = &this.config;
        let stages = this.factory.build()?;
        let (source, sink, endpoints) = audio_channel(
            config.pipeline.frame_queue,
            config.pipeline.synth_queue,
        );

        let settings = PipelineSettings {
            session_id,
            segment_queue: config.pipeline.segment_queue,
            call_timeout: config.request_timeout(),
            retry: RetryPolicy::from_config(&config.provider.retry),
            idle_timeout: config.idle_timeout(),
        };

        // Stage initialization happens here, outside any controller lock.
        let mut handle =
            orchestrator::start(settings, stages, source, sink, this.bus.clone()).await?;

        let mut active = this.active.lock().await;
        if this.state() != SessionState::Starting {
            // A stop() raced the startup; release what we just built.
            drop(active);
            handle.shutdown(this.config.stage_grace()).await;
            return Err(Error::InvalidState(
                "session was stopped during startup".to_string(),
            ));
        }

        let fault_rx = handle
            .take_fault_rx()
            .ok_or_else(|| Error::Internal("pipeline fault channel already taken".to_string()))?;
        let fault_tx = handle.fault_sender();
        let peer_connected = Arc::new(AtomicBool::new(false));

        *this.peer_slot.lock().expect("peer slot lock") = Some(PendingPeer {
            session_id,
            endpoints,
            fault_tx,
            peer_connected: peer_connected.clone(),
            sample_rate: config.audio.sample_rate,
            channels: config.audio.channels,
        });
        *this.session_info.write().expect("session info lock") = Some(SessionInfo {
            session_id,
            started_at: Utc::now(),
            peer_connected,
        });
        *active = Some(ActiveSession {
            id: session_id,
            handle,
        });
        drop(active);

        // Monitor: routes pipeline faults into state transitions.
        let controller = Arc::clone(this);
        let mut fault_rx = fault_rx;
        tokio::spawn(async move {
            if let Some(fault) = fault_rx.recv().await {
                match fault {
                    PipelineFault::Fatal(error) => controller.mark_failed(session_id, error).await,
                    PipelineFault::PeerDisconnected => {
                        controller
                            .finish_session(session_id, EndReason::PeerDisconnected)
                            .await
                    }
                    PipelineFault::IdleTimeout => {
                        controller
                            .finish_session(session_id, EndReason::IdleTimeout)
                            .await
                    }
                }
            }
        });

        let stream_path = format!("/session/{session_id}/stream");
        this.set_state(SessionState::Active);
        this.bus.emit_lossy(ParloEvent::SessionStarted {
            session_id,
            stream_path: stream_path.clone(),
            timestamp: Utc::now(),
        });
        info!(%session_id, "session started");

        Ok(StartInfo {
            session_id,
            stream_path,
        })
    }

    /// Stop the active session, if any. Idempotent: stopping from idle is a
    /// no-op success, and stopping during startup cancels the startup.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(session) => {
                drop(active);
                self.teardown(session, EndReason::ClientStop).await;
            }
            None => {
                if self.state() == SessionState::Starting {
                    // Cancel the in-flight start; its owner will see the
                    // state change and release its resources.
                    info!("stop during startup, cancelling session start");
                    self.set_state(SessionState::Idle);
                }
            }
        }
    }

    /// Graceful-then-forced teardown. Runs on every exit path.
    async fn teardown(&self, session: ActiveSession, reason: EndReason) {
        self.set_state(SessionState::Stopping);

        // No new peer may attach, and the pump's endpoints die with the slot.
        self.peer_slot.lock().expect("peer slot lock").take();

        session.handle.shutdown(self.config.stage_grace()).await;

        *self.session_info.write().expect("session info lock") = None;
        self.set_state(SessionState::Idle);
        self.bus.emit_lossy(ParloEvent::SessionEnded {
            session_id: session.id,
            reason,
            timestamp: Utc::now(),
        });
        info!(session_id = %session.id, %reason, "session ended");
    }

    /// Fatal stage error: park in `failed` until an explicit stop. The
    /// pipeline is cancelled immediately but its resources are only joined
    /// by the eventual `stop()`.
    async fn mark_failed(&self, session_id: Uuid, error: String) {
        let active = self.active.lock().await;
        let matches = active.as_ref().map(|s| s.id) == Some(session_id);
        if !matches {
            return;
        }
        if !matches!(
            self.state(),
            SessionState::Starting | SessionState::Active
        ) {
            return;
        }

        if let Some(session) = active.as_ref() {
            session.handle.cancel();
        }
        self.peer_slot.lock().expect("peer slot lock").take();
        self.set_state(SessionState::Failed);
        self.bus.emit_lossy(ParloEvent::SessionFailed {
            session_id,
            error: error.clone(),
            timestamp: Utc::now(),
        });
        warn!(%session_id, "session failed: {error}");
    }

    /// Pipeline-initiated teardown (peer disconnect, idle timeout). Only
    /// acts if the named session is still the active one.
    async fn finish_session(&self, session_id: Uuid, reason: EndReason) {
        let mut active = self.active.lock().await;
        let matches = active.as_ref().map(|s| s.id) == Some(session_id);
        if matches && self.state() == SessionState::Active {
            let session = active.take().expect("matched session");
            drop(active);
            self.teardown(session, reason).await;
        }
    }

    /// Hand the peer-side channel endpoints to the WebSocket pump. Exactly
    /// one peer per session; later claims are rejected.
    pub fn claim_peer(&self, session_id: Uuid) -> Result<PendingPeer> {
        let mut slot = self.peer_slot.lock().expect("peer slot lock");
        match slot.take() {
            Some(peer) if peer.session_id == session_id => Ok(peer),
            Some(other) => {
                // Wrong session id; keep the slot for the rightful peer.
                *slot = Some(other);
                Err(Error::InvalidState(format!(
                    "no session {session_id} awaiting a peer"
                )))
            }
            None => Err(Error::InvalidState(
                "no session awaiting a peer connection".to_string(),
            )),
        }
    }

    /// Current state plus basic liveness. Never blocks on session mutation.
    pub fn status(&self) -> StatusSnapshot {
        let state = self.state();
        let info = self.session_info.read().expect("session info lock").clone();
        match info {
            Some(info) => {
                let uptime = (Utc::now() - info.started_at).num_milliseconds().max(0) as u64;
                StatusSnapshot {
                    state,
                    session_id: Some(info.session_id),
                    uptime_ms: Some(uptime),
                    peer_connected: Some(info.peer_connected.load(Ordering::Relaxed)),
                }
            }
            None => StatusSnapshot {
                state,
                session_id: None,
                uptime_ms: None,
                peer_connected: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::scripted::{
        ScriptedSpeechToText, ScriptedSynthesizer, ScriptedTranslator,
    };
    use crate::providers::StageSet;
    use std::time::Duration;

    struct ScriptedFactory {
        fatal_stt_after: Option<usize>,
    }

    impl StageFactory for ScriptedFactory {
        fn build(&self) -> Result<StageSet> {
            let mut stt = ScriptedSpeechToText::new("bn").with_finalize_after(3);
            if let Some(n) = self.fatal_stt_after {
                stt = stt.with_fatal_after_feeds(n);
            }
            Ok(StageSet {
                stt: Box::new(stt),
                translator: Box::new(ScriptedTranslator::new("en")),
                synthesizer: Box::new(ScriptedSynthesizer::new(16000, 1)),
            })
        }
    }

    struct FailingFactory;

    impl StageFactory for FailingFactory {
        fn build(&self) -> Result<StageSet> {
            Err(Error::ProviderInit("no backing service".to_string()))
        }
    }

    fn controller_with(factory: Arc<dyn StageFactory>) -> Arc<SessionController> {
        let mut config = Config::default();
        config.session.stage_grace_secs = 1;
        Arc::new(SessionController::new(
            Arc::new(config),
            factory,
            Arc::new(EventBus::new(128)),
        ))
    }

    fn scripted_controller() -> Arc<SessionController> {
        controller_with(Arc::new(ScriptedFactory {
            fatal_stt_after: None,
        }))
    }

    #[tokio::test]
    async fn test_start_transitions_to_active() {
        let controller = scripted_controller();
        assert_eq!(controller.state(), SessionState::Idle);

        let info = controller.clone().start().await.unwrap();
        assert_eq!(controller.state(), SessionState::Active);
        assert!(info.stream_path.contains(&info.session_id.to_string()));

        let status = controller.status();
        assert_eq!(status.state, SessionState::Active);
        assert_eq!(status.session_id, Some(info.session_id));
        assert_eq!(status.peer_connected, Some(false));

        controller.stop().await;
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_second_start_is_already_running() {
        let controller = scripted_controller();
        let first = controller.clone().start().await.unwrap();

        let second = controller.clone().start().await;
        assert!(matches!(second, Err(Error::AlreadyRunning)));

        // The first session is untouched.
        assert_eq!(controller.state(), SessionState::Active);
        assert_eq!(controller.status().session_id, Some(first.session_id));

        controller.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_starts_yield_one_success() {
        let controller = scripted_controller();

        let a = tokio::spawn({
            let c = controller.clone();
            async move { c.start().await }
        });
        let b = tokio::spawn({
            let c = controller.clone();
            async move { c.start().await }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let already_running = results
            .iter()
            .filter(|r| matches!(r, Err(Error::AlreadyRunning)))
            .count();

        assert_eq!(successes, 1, "exactly one concurrent start may win");
        assert_eq!(already_running, 1);
        assert_eq!(controller.state(), SessionState::Active);

        controller.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let controller = scripted_controller();

        // From idle: no-op success.
        controller.stop().await;
        assert_eq!(controller.state(), SessionState::Idle);

        controller.clone().start().await.unwrap();
        controller.stop().await;
        assert_eq!(controller.state(), SessionState::Idle);

        // Twice in a row: same observable end state.
        controller.stop().await;
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_failed_start_reverts_to_idle() {
        let controller = controller_with(Arc::new(FailingFactory));

        let result = controller.clone().start().await;
        assert!(matches!(result, Err(Error::ProviderInit(_))));
        assert_eq!(controller.state(), SessionState::Idle);

        // A later start is not poisoned by the failure (it fails the same
        // way, but from a clean idle state).
        let result = controller.clone().start().await;
        assert!(matches!(result, Err(Error::ProviderInit(_))));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let controller = scripted_controller();

        let first = controller.clone().start().await.unwrap();
        controller.stop().await;
        let second = controller.clone().start().await.unwrap();

        assert_ne!(first.session_id, second.session_id);
        assert_eq!(controller.state(), SessionState::Active);

        controller.stop().await;
    }

    #[tokio::test]
    async fn test_claim_peer_exactly_once() {
        let controller = scripted_controller();
        let info = controller.clone().start().await.unwrap();

        let first = controller.claim_peer(info.session_id);
        assert!(first.is_ok());

        let second = controller.claim_peer(info.session_id);
        assert!(matches!(second, Err(Error::InvalidState(_))));

        controller.stop().await;
    }

    #[tokio::test]
    async fn test_claim_peer_wrong_session_keeps_slot() {
        let controller = scripted_controller();
        let info = controller.clone().start().await.unwrap();

        assert!(controller.claim_peer(Uuid::new_v4()).is_err());
        // The rightful peer can still claim.
        assert!(controller.claim_peer(info.session_id).is_ok());

        controller.stop().await;
    }

    #[tokio::test]
    async fn test_fatal_stage_error_drives_failed_then_stop_recovers() {
        let controller = controller_with(Arc::new(ScriptedFactory {
            fatal_stt_after: Some(1),
        }));
        let info = controller.clone().start().await.unwrap();

        let peer = controller.claim_peer(info.session_id).unwrap();
        let frame = parlo_common::types::AudioFrame::new(vec![1000i16; 160], 16000, 1, 0);
        peer.endpoints.frames_tx.send(frame.clone()).await.unwrap();
        peer.endpoints.frames_tx.send(frame).await.unwrap();

        // The fatal provider error surfaces asynchronously.
        let mut waited = Duration::ZERO;
        while controller.state() != SessionState::Failed && waited < Duration::from_secs(3) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += Duration::from_millis(20);
        }
        assert_eq!(controller.state(), SessionState::Failed);
        assert_eq!(controller.status().state, SessionState::Failed);

        // No auto-restart; an explicit stop returns to idle.
        controller.stop().await;
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_peer_disconnect_tears_session_down() {
        let controller = scripted_controller();
        let info = controller.clone().start().await.unwrap();

        let peer = controller.claim_peer(info.session_id).unwrap();
        // Simulate the pump noticing a disconnect.
        peer.fault_tx
            .send(PipelineFault::PeerDisconnected)
            .unwrap();
        drop(peer);

        let mut waited = Duration::ZERO;
        while controller.state() != SessionState::Idle && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += Duration::from_millis(20);
        }
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.status().session_id.is_none());
    }

    #[tokio::test]
    async fn test_status_reflects_uptime() {
        let controller = scripted_controller();
        controller.clone().start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let status = controller.status();
        assert!(status.uptime_ms.unwrap() >= 20);

        controller.stop().await;
        assert!(controller.status().uptime_ms.is_none());
    }
}
