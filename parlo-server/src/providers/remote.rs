//! Remote HTTP capability providers
//!
//! Each stage talks JSON to its backing service: audio is base64-encoded
//! PCM s16le on the way in, and synthesis responses come back as raw PCM
//! bytes. HTTP status codes are mapped onto the transient/fatal split:
//! auth failures (401/403) are fatal, rate limits (429) and server errors
//! (5xx) are transient, anything else non-successful is fatal.

use super::{ProviderError, SpeechSynthesizer, SpeechToText, Translator};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parlo_common::types::{AudioFrame, Finality, TranscriptSegment, TranslatedSegment};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Internal(format!("failed to create HTTP client: {e}")))
}

fn classify_status(what: &str, status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Fatal(format!("{what}: authentication rejected ({status})"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::Transient(format!("{what}: rate limited ({status})"))
        }
        s if s.is_server_error() => {
            ProviderError::Transient(format!("{what}: service error {s}: {body}"))
        }
        s => ProviderError::Fatal(format!("{what}: unexpected response {s}: {body}")),
    }
}

fn transport_error(what: &str, e: reqwest::Error) -> ProviderError {
    ProviderError::Transient(format!("{what}: request failed: {e}"))
}

/// Probe the service health endpoint, classifying the result like any other
/// provider call. Used by every remote provider's `init`.
async fn health_check(
    client: &Client,
    base_url: &str,
    api_key: &str,
    what: &str,
) -> std::result::Result<(), ProviderError> {
    let url = format!("{base_url}/health");
    let response = client
        .get(&url)
        .bearer_auth(api_key)
        .send()
        .await
        .map_err(|e| transport_error(what, e))?;

    if response.status().is_success() {
        Ok(())
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(what, status, body))
    }
}

fn encode_samples(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    BASE64.encode(bytes)
}

fn decode_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

// ============================================================================
// Speech recognition
// ============================================================================

#[derive(Debug, Serialize)]
struct RecognizeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_b64: Option<String>,
    sample_rate: u32,
    channels: u16,
    language: String,
    /// True on the final call: flush any pending partial as a final segment
    flush: bool,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    segments: Vec<RecognizedSegment>,
}

#[derive(Debug, Deserialize)]
struct RecognizedSegment {
    text: String,
    is_final: bool,
}

/// Streaming recognition over chunked HTTP: one POST per audio frame, the
/// service holds utterance context and answers with zero or more segments.
pub struct HttpSpeechToText {
    client: Client,
    base_url: String,
    api_key: String,
    language: String,
    next_seq: Mutex<u64>,
}

impl HttpSpeechToText {
    pub fn new(base_url: String, api_key: String, language: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url,
            api_key,
            language,
            next_seq: Mutex::new(0),
        })
    }

    async fn recognize(
        &self,
        audio: Option<&AudioFrame>,
        flush: bool,
    ) -> std::result::Result<Vec<TranscriptSegment>, ProviderError> {
        let request = RecognizeRequest {
            audio_b64: audio.map(|f| encode_samples(&f.samples)),
            sample_rate: audio.map(|f| f.sample_rate).unwrap_or(0),
            channels: audio.map(|f| f.channels).unwrap_or(0),
            language: self.language.clone(),
            flush,
        };

        let url = format!("{}/v1/recognize", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("recognize", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("recognize", status, body));
        }

        let parsed: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("recognize: invalid response: {e}")))?;

        let mut next_seq = self.next_seq.lock().expect("seq lock");
        let segments = parsed
            .segments
            .into_iter()
            .map(|seg| {
                let seq = *next_seq;
                *next_seq += 1;
                TranscriptSegment {
                    seq,
                    text: seg.text,
                    language: self.language.clone(),
                    finality: if seg.is_final {
                        Finality::Final
                    } else {
                        Finality::Interim
                    },
                }
            })
            .collect();
        Ok(segments)
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn init(&self) -> std::result::Result<(), ProviderError> {
        health_check(&self.client, &self.base_url, &self.api_key, "recognize").await
    }

    async fn feed(
        &self,
        frame: &AudioFrame,
    ) -> std::result::Result<Vec<TranscriptSegment>, ProviderError> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        self.recognize(Some(frame), false).await
    }

    async fn finish(&self) -> std::result::Result<Vec<TranscriptSegment>, ProviderError> {
        self.recognize(None, true).await
    }
}

// ============================================================================
// Translation
// ============================================================================

#[derive(Debug, Serialize)]
struct TranslateRequest {
    text: String,
    source_language: String,
    target_language: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    text: String,
}

pub struct HttpTranslator {
    client: Client,
    base_url: String,
    api_key: String,
    target: String,
}

impl HttpTranslator {
    pub fn new(base_url: String, api_key: String, target: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url,
            api_key,
            target,
        })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn init(&self) -> std::result::Result<(), ProviderError> {
        health_check(&self.client, &self.base_url, &self.api_key, "translate").await
    }

    async fn translate(
        &self,
        segment: &TranscriptSegment,
    ) -> std::result::Result<TranslatedSegment, ProviderError> {
        let request = TranslateRequest {
            text: segment.text.clone(),
            source_language: segment.language.clone(),
            target_language: self.target.clone(),
        };

        let url = format!("{}/v1/translate", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("translate", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("translate", status, body));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("translate: invalid response: {e}")))?;

        Ok(TranslatedSegment {
            seq: segment.seq,
            text: parsed.text,
            language: self.target.clone(),
        })
    }
}

// ============================================================================
// Speech synthesis
// ============================================================================

#[derive(Debug, Serialize)]
struct SynthesizeRequest {
    text: String,
    language: String,
    sample_rate: u32,
    channels: u16,
}

/// Synthesis over HTTP: JSON request, raw PCM s16le response body.
pub struct HttpSynthesizer {
    client: Client,
    base_url: String,
    api_key: String,
    sample_rate: u32,
    channels: u16,
}

impl HttpSynthesizer {
    pub fn new(
        base_url: String,
        api_key: String,
        sample_rate: u32,
        channels: u16,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url,
            api_key,
            sample_rate,
            channels,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn init(&self) -> std::result::Result<(), ProviderError> {
        health_check(&self.client, &self.base_url, &self.api_key, "synthesize").await
    }

    async fn synthesize(
        &self,
        segment: &TranslatedSegment,
    ) -> std::result::Result<Vec<AudioFrame>, ProviderError> {
        if segment.text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let request = SynthesizeRequest {
            text: segment.text.clone(),
            language: segment.language.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        };

        let url = format!("{}/v1/synthesize", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("synthesize", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("synthesize", status, body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transient(format!("synthesize: read failed: {e}")))?;

        let samples = decode_samples(&bytes);
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        // Split into ~100ms frames so the channel writer streams steadily
        // instead of sending one large message per utterance.
        let frame_samples =
            (self.sample_rate as usize * self.channels as usize / 10).max(1);
        let now_ms = chrono::Utc::now().timestamp_millis() as u64;

        let frames = samples
            .chunks(frame_samples)
            .enumerate()
            .map(|(i, chunk)| {
                AudioFrame::new(
                    chunk.to_vec(),
                    self.sample_rate,
                    self.channels,
                    now_ms + (i as u64 * 100),
                )
            })
            .collect();
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_codec_round_trip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN, 12345];
        let mut bytes = Vec::new();
        for s in &samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        assert_eq!(decode_samples(&bytes), samples);
    }

    #[test]
    fn test_decode_samples_ignores_trailing_byte() {
        let bytes = [0x01, 0x00, 0xFF];
        assert_eq!(decode_samples(&bytes), vec![1i16]);
    }

    #[test]
    fn test_classify_status() {
        let err = classify_status("recognize", StatusCode::UNAUTHORIZED, String::new());
        assert!(err.is_fatal());

        let err = classify_status("recognize", StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(!err.is_fatal());

        let err = classify_status("recognize", StatusCode::BAD_GATEWAY, String::new());
        assert!(!err.is_fatal());

        let err = classify_status("recognize", StatusCode::BAD_REQUEST, String::new());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_encode_samples_is_base64_le() {
        let encoded = encode_samples(&[1i16]);
        assert_eq!(BASE64.decode(encoded).unwrap(), vec![0x01, 0x00]);
    }

    #[tokio::test]
    async fn test_constructors() {
        let timeout = Duration::from_secs(5);
        assert!(HttpSpeechToText::new(
            "http://localhost:9001".into(),
            "key".into(),
            "bn".into(),
            timeout
        )
        .is_ok());
        assert!(
            HttpTranslator::new("http://localhost:9002".into(), "key".into(), "en".into(), timeout)
                .is_ok()
        );
        assert!(HttpSynthesizer::new(
            "http://localhost:9003".into(),
            "key".into(),
            16000,
            1,
            timeout
        )
        .is_ok());
    }
}
