//! parlo-server - speech-to-speech translation service
//!
//! One process holding both halves of the demo: the HTTP control surface
//! (start/stop/status, SSE events, transcript) and the streaming pipeline
//! (WebSocket audio in, recognition → translation → synthesis, audio out).

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod session;

pub use error::{Error, Result};
