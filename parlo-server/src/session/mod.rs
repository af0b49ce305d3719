//! Session lifecycle
//!
//! The controller owning the single active session, and the transcript log
//! that records what flowed through it.

pub mod controller;
pub mod transcript;

pub use controller::{PendingPeer, SessionController, StartInfo, StatusSnapshot};
pub use transcript::TranscriptLog;
