//! # Parlo Common Library
//!
//! Shared code for the parlo speech-to-speech translation service:
//! - Domain types (audio frames, transcript/translated segments)
//! - Event types (ParloEvent enum) and the EventBus

pub mod events;
pub mod types;

pub use events::{EndReason, EventBus, ParloEvent, SessionState};
pub use types::{AudioFrame, Finality, TranscriptEntry, TranscriptSegment, TranslatedSegment};
