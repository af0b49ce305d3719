//! Deterministic in-process providers
//!
//! Back the pipeline without any network service: the recognizer finalizes
//! an utterance every N frames from a fixed script, the translator applies a
//! marker transform, and the synthesizer renders a square-wave placeholder.
//! Used for the offline demo mode and throughout the test suite, with
//! failure injection hooks for exercising the error paths.

use super::{ProviderError, SpeechSynthesizer, SpeechToText, Translator};
use async_trait::async_trait;
use parlo_common::types::{AudioFrame, Finality, TranscriptSegment, TranslatedSegment};
use std::collections::HashSet;
use std::sync::Mutex;

const DEFAULT_SCRIPT: &str = "hello world";

#[derive(Debug, Default)]
struct SttState {
    feeds: usize,
    frames_in_utterance: usize,
    utterance: usize,
    next_seq: u64,
}

/// Recognizer that emits interim prefixes of a scripted text and finalizes
/// after a fixed number of frames.
pub struct ScriptedSpeechToText {
    language: String,
    finalize_after: usize,
    scripts: Vec<String>,
    /// Inject a fatal error once this many feed calls have succeeded
    fatal_after_feeds: Option<usize>,
    state: Mutex<SttState>,
}

impl ScriptedSpeechToText {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            finalize_after: 3,
            scripts: vec![DEFAULT_SCRIPT.to_string()],
            fatal_after_feeds: None,
            state: Mutex::new(SttState::default()),
        }
    }

    /// Texts emitted as final segments, one per utterance, cycling.
    pub fn with_scripts(mut self, scripts: Vec<String>) -> Self {
        if !scripts.is_empty() {
            self.scripts = scripts;
        }
        self
    }

    /// Number of non-empty frames that make up one utterance.
    pub fn with_finalize_after(mut self, frames: usize) -> Self {
        self.finalize_after = frames.max(1);
        self
    }

    /// Fail fatally (as if credentials were revoked) after `feeds` calls.
    pub fn with_fatal_after_feeds(mut self, feeds: usize) -> Self {
        self.fatal_after_feeds = Some(feeds);
        self
    }

    fn script_for(&self, utterance: usize) -> &str {
        &self.scripts[utterance % self.scripts.len()]
    }
}

#[async_trait]
impl SpeechToText for ScriptedSpeechToText {
    async fn init(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn feed(&self, frame: &AudioFrame) -> Result<Vec<TranscriptSegment>, ProviderError> {
        // Input gaps are normal: an empty frame produces nothing and must
        // not terminate recognition.
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.state.lock().expect("stt state lock");
        if let Some(limit) = self.fatal_after_feeds {
            if state.feeds >= limit {
                return Err(ProviderError::Fatal(
                    "recognition service rejected credentials".to_string(),
                ));
            }
        }
        state.feeds += 1;
        state.frames_in_utterance += 1;

        let script = self.script_for(state.utterance).to_string();
        let seq = state.next_seq;
        state.next_seq += 1;

        if state.frames_in_utterance >= self.finalize_after {
            state.frames_in_utterance = 0;
            state.utterance += 1;
            Ok(vec![TranscriptSegment {
                seq,
                text: script,
                language: self.language.clone(),
                finality: Finality::Final,
            }])
        } else {
            // Interim result: a growing prefix of the script.
            let chars: Vec<char> = script.chars().collect();
            let take = (chars.len() * state.frames_in_utterance / self.finalize_after).max(1);
            Ok(vec![TranscriptSegment {
                seq,
                text: chars.into_iter().take(take).collect(),
                language: self.language.clone(),
                finality: Finality::Interim,
            }])
        }
    }

    async fn finish(&self) -> Result<Vec<TranscriptSegment>, ProviderError> {
        let mut state = self.state.lock().expect("stt state lock");
        if state.frames_in_utterance == 0 {
            return Ok(Vec::new());
        }
        // Flush the pending partial utterance as a final.
        let script = self.script_for(state.utterance).to_string();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.frames_in_utterance = 0;
        state.utterance += 1;
        Ok(vec![TranscriptSegment {
            seq,
            text: script,
            language: self.language.clone(),
            finality: Finality::Final,
        }])
    }
}

/// Translator that tags text with the target language.
pub struct ScriptedTranslator {
    target: String,
    transient_seqs: HashSet<u64>,
    fatal_seqs: HashSet<u64>,
}

impl ScriptedTranslator {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            transient_seqs: HashSet::new(),
            fatal_seqs: HashSet::new(),
        }
    }

    /// Always fail transiently on this segment (exhausts the retry budget).
    pub fn with_transient_failure_on(mut self, seq: u64) -> Self {
        self.transient_seqs.insert(seq);
        self
    }

    /// Fail fatally on this segment (drives the session to failed).
    pub fn with_fatal_on(mut self, seq: u64) -> Self {
        self.fatal_seqs.insert(seq);
        self
    }
}

#[async_trait]
impl Translator for ScriptedTranslator {
    async fn init(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn translate(
        &self,
        segment: &TranscriptSegment,
    ) -> Result<TranslatedSegment, ProviderError> {
        if self.fatal_seqs.contains(&segment.seq) {
            return Err(ProviderError::Fatal(
                "translation quota exhausted".to_string(),
            ));
        }
        if self.transient_seqs.contains(&segment.seq) {
            return Err(ProviderError::Transient(
                "simulated rate limit".to_string(),
            ));
        }
        Ok(TranslatedSegment {
            seq: segment.seq,
            text: format!("{} [{}]", segment.text, self.target),
            language: self.target.clone(),
        })
    }
}

/// Synthesizer rendering a deterministic square wave per segment.
pub struct ScriptedSynthesizer {
    sample_rate: u32,
    channels: u16,
    transient_seqs: HashSet<u64>,
}

impl ScriptedSynthesizer {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            transient_seqs: HashSet::new(),
        }
    }

    /// Always fail transiently on this segment (exhausts the retry budget).
    pub fn with_transient_failure_on(mut self, seq: u64) -> Self {
        self.transient_seqs.insert(seq);
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn init(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn synthesize(
        &self,
        segment: &TranslatedSegment,
    ) -> Result<Vec<AudioFrame>, ProviderError> {
        if self.transient_seqs.contains(&segment.seq) {
            return Err(ProviderError::Transient(
                "synthesis service unavailable".to_string(),
            ));
        }

        let text = segment.text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        // ~20ms of audio per 4 characters, at least one frame.
        let frame_count = (text.len() + 3) / 4;
        let samples_per_frame =
            (self.sample_rate as usize * self.channels as usize * 20 / 1000).max(1);
        let now_ms = chrono::Utc::now().timestamp_millis() as u64;

        let frames = (0..frame_count)
            .map(|i| {
                let samples = (0..samples_per_frame)
                    .map(|n| if (n / 40) % 2 == 0 { 3000i16 } else { -3000i16 })
                    .collect();
                AudioFrame::new(
                    samples,
                    self.sample_rate,
                    self.channels,
                    now_ms + (i as u64 * 20),
                )
            })
            .collect();

        Ok(frames)
    }
}
