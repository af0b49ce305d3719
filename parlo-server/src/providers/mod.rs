//! Capability provider contracts for the three pipeline stages
//!
//! Each stage is polymorphic over a trait appropriate to its role; the
//! orchestrator only ever sees these traits. Implementations take `&self`
//! and manage any per-session state internally, so the retry wrapper can
//! re-issue a call without exclusive access.
//!
//! Failures are classified at the provider boundary: `Transient` failures
//! (network blips, rate limits, per-call timeouts) are retried with bounded
//! exponential backoff; `Fatal` failures (authentication, quota exhaustion)
//! propagate to the orchestrator, which drives the session to failed.

pub mod remote;
pub mod scripted;

use crate::config::{Config, ProviderMode, RetryConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parlo_common::types::{AudioFrame, TranscriptSegment, TranslatedSegment};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Stage-level failure classification
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Worth retrying: network blip, rate limit, per-call timeout
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Not worth retrying: authentication failure, quota exhaustion
    #[error("fatal provider error: {0}")]
    Fatal(String),
}

impl ProviderError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProviderError::Fatal(_))
    }
}

/// Streaming speech recognition.
///
/// `feed` accepts one audio frame and returns whatever segments the provider
/// has ready: possibly none, possibly an interim followed later by a final.
/// Short input gaps must not terminate recognition; `finish` flushes any
/// pending partial as a final segment at end of input.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Establish/authenticate the backing connection.
    async fn init(&self) -> std::result::Result<(), ProviderError>;

    async fn feed(
        &self,
        frame: &AudioFrame,
    ) -> std::result::Result<Vec<TranscriptSegment>, ProviderError>;

    async fn finish(&self) -> std::result::Result<Vec<TranscriptSegment>, ProviderError>;
}

/// Text translation, stateless per segment.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn init(&self) -> std::result::Result<(), ProviderError>;

    async fn translate(
        &self,
        segment: &TranscriptSegment,
    ) -> std::result::Result<TranslatedSegment, ProviderError>;
}

/// Speech synthesis. May legitimately produce zero frames for
/// empty/whitespace text.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn init(&self) -> std::result::Result<(), ProviderError>;

    async fn synthesize(
        &self,
        segment: &TranslatedSegment,
    ) -> std::result::Result<Vec<AudioFrame>, ProviderError>;
}

/// The three providers backing one session's pipeline.
pub struct StageSet {
    pub stt: Box<dyn SpeechToText>,
    pub translator: Box<dyn Translator>,
    pub synthesizer: Box<dyn SpeechSynthesizer>,
}

/// Builds a fresh [`StageSet`] per session.
///
/// A trait so tests can inject scripted providers with failure injection
/// without going through configuration.
pub trait StageFactory: Send + Sync {
    fn build(&self) -> Result<StageSet>;
}

/// Factory selecting providers from configuration.
pub struct ConfigStageFactory {
    config: Arc<Config>,
}

impl ConfigStageFactory {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl StageFactory for ConfigStageFactory {
    fn build(&self) -> Result<StageSet> {
        match self.config.provider.mode {
            ProviderMode::Scripted => Ok(StageSet {
                stt: Box::new(scripted::ScriptedSpeechToText::new(
                    &self.config.languages.source,
                )),
                translator: Box::new(scripted::ScriptedTranslator::new(
                    &self.config.languages.target,
                )),
                synthesizer: Box::new(scripted::ScriptedSynthesizer::new(
                    self.config.audio.sample_rate,
                    self.config.audio.channels,
                )),
            }),
            ProviderMode::Remote => {
                let api_key = std::env::var(&self.config.provider.api_key_env).map_err(|_| {
                    Error::Config(format!(
                        "API key environment variable {} is not set",
                        self.config.provider.api_key_env
                    ))
                })?;
                let timeout = self.config.request_timeout();

                let stt_url = required_url(&self.config.provider.stt_url, "provider.stt_url")?;
                let translate_url =
                    required_url(&self.config.provider.translate_url, "provider.translate_url")?;
                let tts_url = required_url(&self.config.provider.tts_url, "provider.tts_url")?;

                Ok(StageSet {
                    stt: Box::new(remote::HttpSpeechToText::new(
                        stt_url,
                        api_key.clone(),
                        self.config.languages.source.clone(),
                        timeout,
                    )?),
                    translator: Box::new(remote::HttpTranslator::new(
                        translate_url,
                        api_key.clone(),
                        self.config.languages.target.clone(),
                        timeout,
                    )?),
                    synthesizer: Box::new(remote::HttpSynthesizer::new(
                        tts_url,
                        api_key,
                        self.config.audio.sample_rate,
                        self.config.audio.channels,
                        timeout,
                    )?),
                })
            }
        }
    }
}

fn required_url(url: &Option<String>, name: &str) -> Result<String> {
    url.clone()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::Config(format!("{name} is required in remote provider mode")))
}

/// Bounded exponential backoff for transient provider failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(retry: &RetryConfig) -> Self {
        Self {
            max_attempts: retry.max_attempts.max(1),
            base_delay: Duration::from_millis(retry.base_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
        }
    }

    /// Delay before the given retry attempt (1-based): base * 2^(n-1), capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// Run a provider call under the retry policy with a per-call timeout.
///
/// A timed-out call counts as transient. Fatal errors return immediately;
/// transient errors are retried up to `max_attempts`, after which the last
/// transient error is returned for the caller to escalate or skip.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    call_timeout: Duration,
    what: &str,
    mut op: F,
) -> std::result::Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, ProviderError>>,
{
    let mut attempt: u32 = 0;
    loop {
        let outcome = match tokio::time::timeout(call_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Transient(format!("{what} call timed out"))),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(ProviderError::Fatal(e)) => return Err(ProviderError::Fatal(e)),
            Err(ProviderError::Transient(e)) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(ProviderError::Transient(format!(
                        "{what} failed after {attempt} attempts: {e}"
                    )));
                }
                let delay = policy.backoff_delay(attempt);
                warn!("{what} transient failure (attempt {attempt}): {e}; retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
