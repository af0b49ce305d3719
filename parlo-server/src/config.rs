//! parlo-server configuration
//!
//! Configuration is resolved in priority order: explicit path from the
//! command line, then the `PARLO_CONFIG` environment variable, then compiled
//! defaults. The file is TOML; every field has a default so a bare
//! installation runs in scripted (offline) provider mode out of the box.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub languages: LanguageConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
    pub pipeline: PipelineConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Translation language pair.
///
/// The pair is configuration, not a structural constant; the defaults match
/// the demo deployment (Bengali in, English out).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    pub source: String,
    pub target: String,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            source: "bn".to_string(),
            target: "en".to_string(),
        }
    }
}

/// Audio format on the streaming channel, both directions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session ends after this long with no inbound audio
    pub idle_timeout_secs: u64,
    /// Per-stage grace period on cancellation before force-abort
    pub stage_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 180,
            stage_grace_secs: 3,
        }
    }
}

/// Bounded queue depths between pipeline stages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub frame_queue: usize,
    pub segment_queue: usize,
    pub synth_queue: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_queue: 32,
            segment_queue: 16,
            synth_queue: 32,
        }
    }
}

/// Which capability providers back the three stages.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// Deterministic in-process providers (offline demo, tests)
    Scripted,
    /// Remote HTTP providers (recognize/translate/synthesize services)
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub mode: ProviderMode,
    pub stt_url: Option<String>,
    pub translate_url: Option<String>,
    pub tts_url: Option<String>,
    /// Environment variable holding the provider API key
    pub api_key_env: String,
    /// Per-call timeout; a timed-out call is retried as transient
    pub request_timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            mode: ProviderMode::Scripted,
            stt_url: None,
            translate_url: None,
            tts_url: None,
            api_key_env: "PARLO_API_KEY".to_string(),
            request_timeout_ms: 10_000,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, the `PARLO_CONFIG`
    /// environment variable, or defaults if neither is set.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var("PARLO_CONFIG").ok().map(Into::into),
        };

        let config = match resolved {
            Some(p) => {
                let raw = std::fs::read_to_string(&p).map_err(|e| {
                    Error::Config(format!("cannot read config file {}: {}", p.display(), e))
                })?;
                toml::from_str(&raw)
                    .map_err(|e| Error::Config(format!("invalid config file: {e}")))?
            }
            None => Config::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration and credentials at startup.
    ///
    /// Remote provider mode requires all three endpoint URLs and a
    /// non-placeholder API key in the configured environment variable.
    /// Credential problems are startup errors only; they never surface
    /// during an active session.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be non-zero".into()));
        }
        if self.audio.channels == 0 {
            return Err(Error::Config("audio.channels must be non-zero".into()));
        }
        if self.languages.source.is_empty() || self.languages.target.is_empty() {
            return Err(Error::Config("language tags must be non-empty".into()));
        }

        if self.provider.mode == ProviderMode::Remote {
            for (name, url) in [
                ("provider.stt_url", &self.provider.stt_url),
                ("provider.translate_url", &self.provider.translate_url),
                ("provider.tts_url", &self.provider.tts_url),
            ] {
                if url.as_deref().map_or(true, str::is_empty) {
                    return Err(Error::Config(format!(
                        "{name} is required in remote provider mode"
                    )));
                }
            }

            let key = std::env::var(&self.provider.api_key_env).map_err(|_| {
                Error::Config(format!(
                    "API key environment variable {} is not set",
                    self.provider.api_key_env
                ))
            })?;
            if key.is_empty() || key.starts_with("your_") {
                return Err(Error::Config(format!(
                    "API key in {} looks like a placeholder",
                    self.provider.api_key_env
                )));
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.provider.request_timeout_ms)
    }

    pub fn stage_grace(&self) -> Duration {
        Duration::from_secs(self.session.stage_grace_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.languages.source, "bn");
        assert_eq!(config.languages.target, "en");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.session.idle_timeout_secs, 180);
        assert_eq!(config.pipeline.frame_queue, 32);
        assert_eq!(config.provider.mode, ProviderMode::Scripted);
        assert_eq!(config.provider.retry.max_attempts, 3);
    }

    #[test]
    fn test_defaults_validate() {
        Config::default().validate().expect("defaults must be valid");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [server]
            port = 9100

            [languages]
            source = "de"
            target = "fr"

            [session]
            idle_timeout_secs = 30
            "#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.languages.source, "de");
        assert_eq!(config.languages.target, "fr");
        assert_eq!(config.session.idle_timeout_secs, 30);
        // Unspecified sections keep their defaults
        assert_eq!(config.audio.sample_rate, 16000);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/parlo.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_remote_mode_requires_urls() {
        let mut config = Config::default();
        config.provider.mode = ProviderMode::Remote;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stt_url"));
    }

    #[test]
    fn test_remote_mode_requires_api_key() {
        let mut config = Config::default();
        config.provider.mode = ProviderMode::Remote;
        config.provider.stt_url = Some("http://localhost:9001".into());
        config.provider.translate_url = Some("http://localhost:9002".into());
        config.provider.tts_url = Some("http://localhost:9003".into());
        config.provider.api_key_env = "PARLO_TEST_KEY_THAT_IS_NOT_SET".into();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("PARLO_TEST_KEY_THAT_IS_NOT_SET"));
    }

    #[test]
    fn test_invalid_audio_config() {
        let mut config = Config::default();
        config.audio.sample_rate = 0;
        assert!(config.validate().is_err());
    }
}
