//! Error types for parlo-server
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Stage-level failures use the transient/fatal split in
//! `providers::ProviderError`; this enum is the controller- and
//! API-facing taxonomy.

use thiserror::Error;

/// Main error type for parlo-server
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration/credentials (startup only)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stage could not authenticate/initialize with its backing service
    #[error("Provider initialization failed: {0}")]
    ProviderInit(String),

    /// start() while a session is not idle
    #[error("A session is already running")]
    AlreadyRunning,

    /// Operation not valid in the current controller state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The streaming peer has disconnected
    #[error("Audio channel closed")]
    ChannelClosed,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using parlo-server Error
pub type Result<T> = std::result::Result<T, Error>;
