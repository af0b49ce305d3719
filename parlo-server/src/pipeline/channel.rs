//! Audio stream channel
//!
//! The channel between the streaming peer and the pipeline is a pair of
//! bounded FIFO queues: client audio flows in through one, synthesized audio
//! flows out through the other. The WebSocket pump holds the peer-side
//! endpoints; the pipeline holds the source/sink halves. Dropping the
//! peer-side sender is how disconnects reach the pipeline: the source simply
//! runs dry.
//!
//! Wire framing: one WebSocket Binary message is one self-contained frame of
//! raw PCM s16le samples at the session's configured rate and channel count.
//! The channel does no buffering or resampling of its own.

use crate::error::{Error, Result};
use parlo_common::types::AudioFrame;
use tokio::sync::mpsc;

/// Pipeline-side receive half: client audio in arrival order.
pub struct ChannelSource {
    rx: mpsc::Receiver<AudioFrame>,
}

impl ChannelSource {
    /// Next frame from the peer; `None` once the peer has disconnected and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        self.rx.recv().await
    }
}

/// Pipeline-side send half: synthesized audio back to the peer.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<AudioFrame>,
}

impl ChannelSink {
    /// Enqueue a frame for transmission. Suspends while the outbound queue
    /// is full (backpressure); fails with `ChannelClosed` once the peer has
    /// disconnected.
    pub async fn send(&self, frame: AudioFrame) -> Result<()> {
        self.tx.send(frame).await.map_err(|_| Error::ChannelClosed)
    }
}

/// Peer-side endpoints, handed to the WebSocket pump when the client
/// connects. Exactly one peer per session: the session holds these in a
/// take-once slot.
pub struct PeerEndpoints {
    /// Client audio into the pipeline
    pub frames_tx: mpsc::Sender<AudioFrame>,
    /// Synthesized audio out to the client
    pub audio_rx: mpsc::Receiver<AudioFrame>,
}

/// Create the channel for one session.
pub fn audio_channel(
    inbound_depth: usize,
    outbound_depth: usize,
) -> (ChannelSource, ChannelSink, PeerEndpoints) {
    let (frames_tx, frames_rx) = mpsc::channel(inbound_depth.max(1));
    let (audio_tx, audio_rx) = mpsc::channel(outbound_depth.max(1));
    (
        ChannelSource { rx: frames_rx },
        ChannelSink { tx: audio_tx },
        PeerEndpoints {
            frames_tx,
            audio_rx,
        },
    )
}

/// Decode one binary WebSocket message into an audio frame.
///
/// A trailing odd byte is dropped; an empty payload yields an empty frame
/// (treated as an input gap by the recognition stage).
pub fn decode_pcm(bytes: &[u8], sample_rate: u32, channels: u16, timestamp_ms: u64) -> AudioFrame {
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    AudioFrame::new(samples, sample_rate, channels, timestamp_ms)
}

/// Encode an audio frame as one binary WebSocket message.
pub fn encode_pcm(frame: &AudioFrame) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frame.samples.len() * 2);
    for s in &frame.samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}
