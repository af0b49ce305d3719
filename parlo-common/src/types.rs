//! Domain types shared across the parlo pipeline
//!
//! Frames and segments are moved between stages by value; once produced they
//! are never mutated, so ordering metadata stamped at creation stays valid
//! end to end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timestamped chunk of raw PCM audio samples.
///
/// Samples are signed 16-bit little-endian, interleaved when `channels > 1`.
/// The timestamp is assigned when the frame enters the process (channel
/// ingress for client audio, synthesis time for generated audio).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16, timestamp_ms: u64) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            timestamp_ms,
        }
    }

    /// Duration of this frame in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Finality of a transcript segment.
///
/// Interim segments give the user prompt feedback but may be superseded by a
/// later segment with a higher sequence number; only `Final` segments are
/// forwarded down the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finality {
    Interim,
    Final,
}

impl std::fmt::Display for Finality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Finality::Interim => write!(f, "interim"),
            Finality::Final => write!(f, "final"),
        }
    }
}

/// A unit of recognized text in the source language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Monotonically increasing per session; stamped by the recognition stage.
    pub seq: u64,
    pub text: String,
    pub language: String,
    pub finality: Finality,
}

impl TranscriptSegment {
    pub fn is_final(&self) -> bool {
        self.finality == Finality::Final
    }
}

/// A unit of translated text in the target language, derived 1:1 from a
/// final [`TranscriptSegment`] and carrying its sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedSegment {
    pub seq: u64,
    pub text: String,
    pub language: String,
}

/// One line of the session transcript, as exposed by the transcript endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub seq: u64,
    /// "source" for recognized text, "translation" for translated text.
    pub role: String,
    pub text: String,
    pub language: String,
    pub timestamp: DateTime<Utc>,
}
