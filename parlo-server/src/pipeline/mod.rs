//! Streaming translation pipeline
//!
//! The audio stream channel and the orchestrator that wires the three
//! capability stages together. Each stage runs in its own task, connected by
//! bounded queues for backpressure.

pub mod channel;
pub mod orchestrator;

pub use channel::{audio_channel, decode_pcm, encode_pcm, ChannelSink, ChannelSource, PeerEndpoints};
pub use orchestrator::{PipelineFault, PipelineHandle, PipelineSettings};
