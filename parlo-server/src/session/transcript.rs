//! Session transcript log
//!
//! Bounded in-memory record of what flowed through the pipeline, fed by an
//! EventBus subscriber so the stages stay decoupled from reporting. Entries
//! survive a stop (the last session's transcript remains readable) and are
//! cleared when a new session starts.

use parlo_common::events::{EventBus, ParloEvent};
use parlo_common::types::TranscriptEntry;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

pub struct TranscriptLog {
    entries: RwLock<VecDeque<TranscriptEntry>>,
    capacity: usize,
}

impl TranscriptLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, entry: TranscriptEntry) {
        let mut entries = self.entries.write().expect("transcript lock");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.entries
            .read()
            .expect("transcript lock")
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.write().expect("transcript lock").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("transcript lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fold transcript-bearing events into the log until the bus closes.
pub fn spawn_collector(log: Arc<TranscriptLog>, bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ParloEvent::SessionStarted { .. }) => log.clear(),
                Ok(ParloEvent::FinalTranscript {
                    seq,
                    text,
                    language,
                    timestamp,
                    ..
                }) => log.push(TranscriptEntry {
                    seq,
                    role: "source".to_string(),
                    text,
                    language,
                    timestamp,
                }),
                Ok(ParloEvent::TranslationProduced {
                    seq,
                    text,
                    language,
                    timestamp,
                    ..
                }) => log.push(TranscriptEntry {
                    seq,
                    role: "translation".to_string(),
                    text,
                    language,
                    timestamp,
                }),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!("transcript collector lagged, {missed} events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
