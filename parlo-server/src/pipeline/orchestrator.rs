//! Pipeline orchestrator
//!
//! Wires recognition → translation → synthesis into one directional flow.
//! Every stage runs as its own tokio task; stages communicate only through
//! bounded single-producer/single-consumer queues, so backpressure is a
//! suspended `send` on a full queue and end-to-end ordering falls out of
//! FIFO delivery plus in-order stage loops.
//!
//! Cancellation is cooperative: one watch signal from the controller, checked
//! between frames/segments. Each stage gets a bounded grace period to finish
//! in-flight work before it is force-aborted, in stage order.

use crate::error::{Error, Result};
use crate::pipeline::channel::{ChannelSink, ChannelSource};
use crate::providers::{
    call_with_retry, ProviderError, RetryPolicy, SpeechSynthesizer, SpeechToText, StageSet,
    Translator,
};
use parlo_common::events::{EventBus, ParloEvent};
use parlo_common::types::{TranscriptSegment, TranslatedSegment};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why the pipeline needs controller attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineFault {
    /// A stage hit an unrecoverable provider error
    Fatal(String),
    /// The streaming peer went away
    PeerDisconnected,
    /// No inbound audio within the idle timeout
    IdleTimeout,
}

/// Per-session pipeline parameters, resolved from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub session_id: Uuid,
    pub segment_queue: usize,
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    pub idle_timeout: Duration,
}

/// Handle to a running pipeline.
///
/// Owned by the session controller; `shutdown` is the only teardown path and
/// runs on every exit (stop request, disconnect, failure), so stage
/// resources are released regardless of how the session ends.
pub struct PipelineHandle {
    cancel_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    fault_tx: mpsc::UnboundedSender<PipelineFault>,
    fault_rx: Option<mpsc::UnboundedReceiver<PipelineFault>>,
}

impl PipelineHandle {
    /// Signal cooperative cancellation to all stages.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Sender for out-of-band faults (used by the WebSocket pump to report
    /// peer disconnects into the same path as stage faults).
    pub fn fault_sender(&self) -> mpsc::UnboundedSender<PipelineFault> {
        self.fault_tx.clone()
    }

    /// Receiver for faults; taken once by the controller's monitor task.
    pub fn take_fault_rx(&mut self) -> Option<mpsc::UnboundedReceiver<PipelineFault>> {
        self.fault_rx.take()
    }

    /// Cancel, then await each stage with a bounded grace period, aborting
    /// any stage that exceeds it. Stages are drained in pipeline order.
    pub async fn shutdown(self, grace: Duration) {
        let _ = self.cancel_tx.send(true);

        for (name, mut task) in self.tasks {
            match tokio::time::timeout(grace, &mut task).await {
                Ok(Ok(())) => debug!("pipeline stage {name} finished"),
                Ok(Err(e)) if e.is_panic() => error!("pipeline stage {name} panicked"),
                Ok(Err(_)) => debug!("pipeline stage {name} cancelled"),
                Err(_) => {
                    warn!("pipeline stage {name} exceeded {grace:?} grace period, aborting");
                    task.abort();
                    let _ = task.await;
                }
            }
        }
        info!("pipeline shut down");
    }
}

/// Initialize all stage providers and spawn the stage tasks.
///
/// Provider initialization happens here, before anything is spawned; a
/// failure surfaces as `ProviderInit` and leaves nothing running.
pub async fn start(
    settings: PipelineSettings,
    stages: StageSet,
    source: ChannelSource,
    sink: ChannelSink,
    bus: Arc<EventBus>,
) -> Result<PipelineHandle> {
    let StageSet {
        stt,
        translator,
        synthesizer,
    } = stages;

    // Stage order: a failure in a later stage must not leave an earlier one
    // holding a half-open provider connection.
    stt.init()
        .await
        .map_err(|e| Error::ProviderInit(format!("recognition: {e}")))?;
    translator
        .init()
        .await
        .map_err(|e| Error::ProviderInit(format!("translation: {e}")))?;
    synthesizer
        .init()
        .await
        .map_err(|e| Error::ProviderInit(format!("synthesis: {e}")))?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (fault_tx, fault_rx) = mpsc::unbounded_channel();
    let (finals_tx, finals_rx) = mpsc::channel::<TranscriptSegment>(settings.segment_queue.max(1));
    let (synth_tx, synth_rx) = mpsc::channel::<TranslatedSegment>(settings.segment_queue.max(1));

    let last_activity = Arc::new(AtomicU64::new(now_ms()));

    let stt_task = tokio::spawn(run_recognition(
        settings.clone(),
        stt,
        source,
        finals_tx,
        bus.clone(),
        cancel_rx.clone(),
        fault_tx.clone(),
        last_activity.clone(),
    ));

    let translate_task = tokio::spawn(run_translation(
        settings.clone(),
        translator,
        finals_rx,
        synth_tx,
        bus.clone(),
        cancel_rx.clone(),
        fault_tx.clone(),
    ));

    let synth_task = tokio::spawn(run_synthesis(
        settings.clone(),
        synthesizer,
        synth_rx,
        sink,
        bus.clone(),
        cancel_rx.clone(),
        fault_tx.clone(),
    ));

    let watchdog_task = tokio::spawn(run_idle_watchdog(
        settings.idle_timeout,
        last_activity,
        cancel_rx,
        fault_tx.clone(),
    ));

    info!(session_id = %settings.session_id, "pipeline started");

    Ok(PipelineHandle {
        cancel_tx,
        tasks: vec![
            ("recognition", stt_task),
            ("translation", translate_task),
            ("synthesis", synth_task),
            ("idle-watchdog", watchdog_task),
        ],
        fault_tx,
        fault_rx: Some(fault_rx),
    })
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Recognition stage: channel frames in, final transcript segments out.
/// Interim segments are broadcast for responsiveness but never forwarded.
#[allow(clippy::too_many_arguments)]
async fn run_recognition(
    settings: PipelineSettings,
    stt: Box<dyn SpeechToText>,
    mut source: ChannelSource,
    finals_tx: mpsc::Sender<TranscriptSegment>,
    bus: Arc<EventBus>,
    mut cancel: watch::Receiver<bool>,
    fault_tx: mpsc::UnboundedSender<PipelineFault>,
    last_activity: Arc<AtomicU64>,
) {
    let session_id = settings.session_id;

    loop {
        let frame = tokio::select! {
            _ = cancel.changed() => {
                debug!("recognition stage cancelled");
                return;
            }
            maybe = source.recv() => match maybe {
                Some(frame) => frame,
                None => break, // peer disconnected: flush and wind down
            },
        };

        last_activity.store(now_ms(), Ordering::Relaxed);

        let stt_ref: &dyn SpeechToText = stt.as_ref();
        let frame_ref = &frame;
        let result = call_with_retry(
            &settings.retry,
            settings.call_timeout,
            "recognize",
            move || stt_ref.feed(frame_ref),
        )
        .await;

        let segments = match result {
            Ok(segments) => segments,
            // Recognition input cannot be meaningfully skipped: an exhausted
            // retry budget escalates the same way a fatal error does.
            Err(e) => {
                error!("recognition stage failed: {e}");
                let _ = fault_tx.send(PipelineFault::Fatal(e.to_string()));
                return;
            }
        };

        if !forward_segments(&settings, segments, &finals_tx, &bus).await {
            return; // downstream gone
        }
    }

    // End of input: flush any pending partial as finals.
    let stt_ref: &dyn SpeechToText = stt.as_ref();
    match call_with_retry(
        &settings.retry,
        settings.call_timeout,
        "recognize flush",
        move || stt_ref.finish(),
    )
    .await
    {
        Ok(segments) => {
            forward_segments(&settings, segments, &finals_tx, &bus).await;
        }
        Err(e) => warn!("recognition flush failed: {e}"),
    }
    debug!(session_id = %session_id, "recognition stage finished");
}

/// Broadcast every segment; forward only finals. Returns false when the
/// downstream queue is gone.
async fn forward_segments(
    settings: &PipelineSettings,
    segments: Vec<TranscriptSegment>,
    finals_tx: &mpsc::Sender<TranscriptSegment>,
    bus: &EventBus,
) -> bool {
    for segment in segments {
        if segment.is_final() {
            bus.emit_lossy(ParloEvent::FinalTranscript {
                session_id: settings.session_id,
                seq: segment.seq,
                text: segment.text.clone(),
                language: segment.language.clone(),
                timestamp: chrono::Utc::now(),
            });
            if finals_tx.send(segment).await.is_err() {
                return false;
            }
        } else {
            bus.emit_lossy(ParloEvent::InterimTranscript {
                session_id: settings.session_id,
                seq: segment.seq,
                text: segment.text.clone(),
                language: segment.language.clone(),
                timestamp: chrono::Utc::now(),
            });
        }
    }
    true
}

/// Translation stage: one translated segment per final transcript segment,
/// same order. A segment whose retry budget is exhausted is skipped; the
/// stream continues.
async fn run_translation(
    settings: PipelineSettings,
    translator: Box<dyn Translator>,
    mut finals_rx: mpsc::Receiver<TranscriptSegment>,
    synth_tx: mpsc::Sender<TranslatedSegment>,
    bus: Arc<EventBus>,
    mut cancel: watch::Receiver<bool>,
    fault_tx: mpsc::UnboundedSender<PipelineFault>,
) {
    loop {
        let segment = tokio::select! {
            _ = cancel.changed() => {
                debug!("translation stage cancelled");
                return;
            }
            maybe = finals_rx.recv() => match maybe {
                Some(segment) => segment,
                None => break,
            },
        };

        let translator_ref: &dyn Translator = translator.as_ref();
        let segment_ref = &segment;
        let result = call_with_retry(
            &settings.retry,
            settings.call_timeout,
            "translate",
            move || translator_ref.translate(segment_ref),
        )
        .await;

        match result {
            Ok(translated) => {
                bus.emit_lossy(ParloEvent::TranslationProduced {
                    session_id: settings.session_id,
                    seq: translated.seq,
                    text: translated.text.clone(),
                    language: translated.language.clone(),
                    timestamp: chrono::Utc::now(),
                });
                if synth_tx.send(translated).await.is_err() {
                    return;
                }
            }
            Err(ProviderError::Fatal(e)) => {
                error!("translation stage failed: {e}");
                let _ = fault_tx.send(PipelineFault::Fatal(e));
                return;
            }
            Err(ProviderError::Transient(e)) => {
                warn!("skipping segment {}: {e}", segment.seq);
                bus.emit_lossy(ParloEvent::SegmentSkipped {
                    session_id: settings.session_id,
                    seq: segment.seq,
                    stage: "translation".to_string(),
                    reason: e,
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    }
    debug!(session_id = %settings.session_id, "translation stage finished");
}

/// Synthesis stage: translated segments in, audio frames out to the channel.
async fn run_synthesis(
    settings: PipelineSettings,
    synthesizer: Box<dyn SpeechSynthesizer>,
    mut synth_rx: mpsc::Receiver<TranslatedSegment>,
    sink: ChannelSink,
    bus: Arc<EventBus>,
    mut cancel: watch::Receiver<bool>,
    fault_tx: mpsc::UnboundedSender<PipelineFault>,
) {
    loop {
        let segment = tokio::select! {
            _ = cancel.changed() => {
                debug!("synthesis stage cancelled");
                return;
            }
            maybe = synth_rx.recv() => match maybe {
                Some(segment) => segment,
                None => break,
            },
        };

        let synth_ref: &dyn SpeechSynthesizer = synthesizer.as_ref();
        let segment_ref = &segment;
        let result = call_with_retry(
            &settings.retry,
            settings.call_timeout,
            "synthesize",
            move || synth_ref.synthesize(segment_ref),
        )
        .await;

        match result {
            Ok(frames) => {
                for frame in frames {
                    if sink.send(frame).await.is_err() {
                        // Peer gone; the pump reports the disconnect.
                        debug!("synthesis stage: audio channel closed");
                        return;
                    }
                }
            }
            Err(ProviderError::Fatal(e)) => {
                error!("synthesis stage failed: {e}");
                let _ = fault_tx.send(PipelineFault::Fatal(e));
                return;
            }
            Err(ProviderError::Transient(e)) => {
                warn!("skipping segment {}: {e}", segment.seq);
                bus.emit_lossy(ParloEvent::SegmentSkipped {
                    session_id: settings.session_id,
                    seq: segment.seq,
                    stage: "synthesis".to_string(),
                    reason: e,
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    }
    debug!(session_id = %settings.session_id, "synthesis stage finished");
}

/// Ends the session when no inbound audio arrives within the idle timeout.
async fn run_idle_watchdog(
    idle_timeout: Duration,
    last_activity: Arc<AtomicU64>,
    mut cancel: watch::Receiver<bool>,
    fault_tx: mpsc::UnboundedSender<PipelineFault>,
) {
    let check_interval = (idle_timeout / 4).max(Duration::from_millis(50));

    loop {
        tokio::select! {
            _ = cancel.changed() => return,
            _ = tokio::time::sleep(check_interval) => {
                let idle = now_ms().saturating_sub(last_activity.load(Ordering::Relaxed));
                if idle >= idle_timeout.as_millis() as u64 {
                    info!("session idle for {idle}ms, requesting teardown");
                    let _ = fault_tx.send(PipelineFault::IdleTimeout);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::audio_channel;
    use crate::providers::scripted::{
        ScriptedSpeechToText, ScriptedSynthesizer, ScriptedTranslator,
    };
    use parlo_common::types::AudioFrame;

    fn test_settings(idle_timeout: Duration) -> PipelineSettings {
        PipelineSettings {
            session_id: Uuid::new_v4(),
            segment_queue: 16,
            call_timeout: Duration::from_secs(1),
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
            },
            idle_timeout,
        }
    }

    fn scripted_stages() -> StageSet {
        StageSet {
            stt: Box::new(ScriptedSpeechToText::new("bn").with_finalize_after(3)),
            translator: Box::new(ScriptedTranslator::new("en")),
            synthesizer: Box::new(ScriptedSynthesizer::new(16000, 1)),
        }
    }

    fn frame(ts: u64) -> AudioFrame {
        AudioFrame::new(vec![1000i16; 160], 16000, 1, ts)
    }

    async fn recv_within<T>(rx: &mut mpsc::Receiver<T>, ms: u64) -> Option<T> {
        tokio::time::timeout(Duration::from_millis(ms), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_one_utterance_flows_end_to_end() {
        let bus = Arc::new(EventBus::new(64));
        let mut events = bus.subscribe();
        let (source, sink, mut peer) = audio_channel(32, 32);

        let handle = start(
            test_settings(Duration::from_secs(30)),
            scripted_stages(),
            source,
            sink,
            bus,
        )
        .await
        .unwrap();

        // Three frames make one utterance in the scripted recognizer.
        for n in 0..3 {
            peer.frames_tx.send(frame(n)).await.unwrap();
        }

        // At least one synthesized frame comes back.
        let audio = recv_within(&mut peer.audio_rx, 2000).await;
        assert!(audio.is_some(), "expected synthesized audio");

        // Causal order: final transcript before its translation.
        let mut saw_final = false;
        let mut saw_translation = false;
        while let Ok(Ok(event)) =
            tokio::time::timeout(Duration::from_millis(500), events.recv()).await
        {
            match event {
                ParloEvent::FinalTranscript { seq, .. } => {
                    assert!(!saw_translation, "final must precede translation");
                    assert_eq!(seq, 2);
                    saw_final = true;
                }
                ParloEvent::TranslationProduced { seq, text, .. } => {
                    assert!(saw_final);
                    assert_eq!(seq, 2);
                    assert!(text.contains("hello world"));
                    saw_translation = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_final && saw_translation);

        handle.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_disconnect_flushes_and_finishes() {
        let bus = Arc::new(EventBus::new(64));
        let (source, sink, mut peer) = audio_channel(32, 32);

        let mut handle = start(
            test_settings(Duration::from_secs(30)),
            scripted_stages(),
            source,
            sink,
            bus,
        )
        .await
        .unwrap();
        let _fault_rx = handle.take_fault_rx();

        // One frame short of a full utterance, then disconnect.
        peer.frames_tx.send(frame(0)).await.unwrap();
        peer.frames_tx.send(frame(1)).await.unwrap();
        drop(peer.frames_tx);

        // The flush produces a final, which is translated and synthesized.
        let audio = recv_within(&mut peer.audio_rx, 2000).await;
        assert!(audio.is_some(), "flush on disconnect should produce audio");

        handle.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_translated_segments_stay_ordered() {
        let bus = Arc::new(EventBus::new(128));
        let mut events = bus.subscribe();
        let (source, sink, mut peer) = audio_channel(32, 32);

        let stages = StageSet {
            stt: Box::new(
                ScriptedSpeechToText::new("bn")
                    .with_finalize_after(3)
                    .with_scripts(vec!["one".into(), "two".into(), "three".into()]),
            ),
            translator: Box::new(ScriptedTranslator::new("en")),
            synthesizer: Box::new(ScriptedSynthesizer::new(16000, 1)),
        };

        let handle = start(
            test_settings(Duration::from_secs(30)),
            stages,
            source,
            sink,
            bus,
        )
        .await
        .unwrap();

        // Three utterances worth of frames.
        for n in 0..9 {
            peer.frames_tx.send(frame(n)).await.unwrap();
        }

        // Keep the outbound queue draining so synthesis never stalls.
        let drain = tokio::spawn(async move { while peer.audio_rx.recv().await.is_some() {} });

        let mut translated_seqs = Vec::new();
        while translated_seqs.len() < 3 {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Ok(ParloEvent::TranslationProduced { seq, .. })) => translated_seqs.push(seq),
                Ok(Ok(_)) => {}
                _ => break,
            }
        }

        assert_eq!(translated_seqs.len(), 3, "expected three translations");
        let mut sorted = translated_seqs.clone();
        sorted.sort_unstable();
        assert_eq!(translated_seqs, sorted, "order must be preserved");

        handle.shutdown(Duration::from_secs(2)).await;
        drain.abort();
    }

    #[tokio::test]
    async fn test_translation_failure_skips_single_segment() {
        let bus = Arc::new(EventBus::new(128));
        let mut events = bus.subscribe();
        let (source, sink, mut peer) = audio_channel(32, 32);

        // First final carries seq 2 (two interims precede it).
        let stages = StageSet {
            stt: Box::new(ScriptedSpeechToText::new("bn").with_finalize_after(3)),
            translator: Box::new(ScriptedTranslator::new("en").with_transient_failure_on(2)),
            synthesizer: Box::new(ScriptedSynthesizer::new(16000, 1)),
        };

        let handle = start(
            test_settings(Duration::from_secs(30)),
            stages,
            source,
            sink,
            bus,
        )
        .await
        .unwrap();

        // Two utterances: the first is skipped, the second flows through.
        for n in 0..6 {
            peer.frames_tx.send(frame(n)).await.unwrap();
        }

        let mut skipped = None;
        let mut translated = None;
        while skipped.is_none() || translated.is_none() {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Ok(ParloEvent::SegmentSkipped { seq, stage, .. })) => {
                    assert_eq!(stage, "translation");
                    skipped = Some(seq);
                }
                Ok(Ok(ParloEvent::TranslationProduced { seq, .. })) => translated = Some(seq),
                Ok(Ok(_)) => {}
                _ => break,
            }
        }

        assert_eq!(skipped, Some(2), "first final should be skipped");
        assert_eq!(translated, Some(5), "second final should still flow");

        // The surviving segment still produces audio.
        let audio = recv_within(&mut peer.audio_rx, 2000).await;
        assert!(audio.is_some());

        handle.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_fatal_recognition_error_raises_fault() {
        let bus = Arc::new(EventBus::new(64));
        let (source, sink, peer) = audio_channel(32, 32);

        let stages = StageSet {
            stt: Box::new(
                ScriptedSpeechToText::new("bn")
                    .with_finalize_after(3)
                    .with_fatal_after_feeds(1),
            ),
            translator: Box::new(ScriptedTranslator::new("en")),
            synthesizer: Box::new(ScriptedSynthesizer::new(16000, 1)),
        };

        let mut handle = start(
            test_settings(Duration::from_secs(30)),
            stages,
            source,
            sink,
            bus,
        )
        .await
        .unwrap();
        let mut fault_rx = handle.take_fault_rx().unwrap();

        peer.frames_tx.send(frame(0)).await.unwrap();
        peer.frames_tx.send(frame(1)).await.unwrap();

        let fault = tokio::time::timeout(Duration::from_secs(2), fault_rx.recv())
            .await
            .expect("fault expected")
            .unwrap();
        assert!(matches!(fault, PipelineFault::Fatal(_)));

        handle.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_idle_watchdog_raises_timeout_fault() {
        let bus = Arc::new(EventBus::new(64));
        let (source, sink, _peer) = audio_channel(32, 32);

        let mut handle = start(
            test_settings(Duration::from_millis(100)),
            scripted_stages(),
            source,
            sink,
            bus,
        )
        .await
        .unwrap();
        let mut fault_rx = handle.take_fault_rx().unwrap();

        let fault = tokio::time::timeout(Duration::from_secs(2), fault_rx.recv())
            .await
            .expect("idle fault expected")
            .unwrap();
        assert_eq!(fault, PipelineFault::IdleTimeout);

        handle.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_shutdown_completes_promptly() {
        let bus = Arc::new(EventBus::new(64));
        let (source, sink, _peer) = audio_channel(32, 32);

        let handle = start(
            test_settings(Duration::from_secs(30)),
            scripted_stages(),
            source,
            sink,
            bus,
        )
        .await
        .unwrap();

        let started = std::time::Instant::now();
        handle.shutdown(Duration::from_secs(2)).await;
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "shutdown should finish within the grace budget"
        );
    }

    #[tokio::test]
    async fn test_provider_init_failure_surfaces() {
        struct BadInitStt;
        #[async_trait::async_trait]
        impl SpeechToText for BadInitStt {
            async fn init(&self) -> std::result::Result<(), ProviderError> {
                Err(ProviderError::Fatal("bad credentials".into()))
            }
            async fn feed(
                &self,
                _frame: &AudioFrame,
            ) -> std::result::Result<Vec<TranscriptSegment>, ProviderError> {
                Ok(Vec::new())
            }
            async fn finish(
                &self,
            ) -> std::result::Result<Vec<TranscriptSegment>, ProviderError> {
                Ok(Vec::new())
            }
        }

        let bus = Arc::new(EventBus::new(64));
        let (source, sink, _peer) = audio_channel(32, 32);
        let stages = StageSet {
            stt: Box::new(BadInitStt),
            translator: Box::new(ScriptedTranslator::new("en")),
            synthesizer: Box::new(ScriptedSynthesizer::new(16000, 1)),
        };

        let result = start(
            test_settings(Duration::from_secs(30)),
            stages,
            source,
            sink,
            bus,
        )
        .await;

        match result {
            Err(Error::ProviderInit(msg)) => assert!(msg.contains("recognition")),
            other => panic!("expected ProviderInit, got {:?}", other.map(|_| ())),
        }
    }
}
