//! # Configuration Management
//!
//! Loads application configuration from layered sources, highest priority
//! last:
//! 1. Built-in defaults (the `Default` impls below)
//! 2. `config.toml` in the working directory (optional)
//! 3. Environment variables with the `APP_` prefix
//! 4. Bare `HOST` / `PORT` variables used by deployment platforms
//!
//! Sections mirror the parts of the system they configure: the HTTP server,
//! the streaming session's trigger constants, the transcription engine
//! boundary, and the channel-auth token table.

use crate::session::trigger::TriggerConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub streaming: StreamingConfig,
    pub engine: EngineConfig,
    pub auth: AuthConfig,
}

/// Bind address for the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Constants governing one streaming session.
///
/// ## Tuning notes:
/// - `min_chunk_bytes` bounds how little audio a periodic pass may see;
///   `double_chunk_factor` bounds how much may pile up unprocessed
/// - `process_interval_ms` bounds worst-case per-segment latency
/// - `poll_window_ms` is scheduling granularity for idle checks, not a
///   protocol deadline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Minimum buffer size before a periodic pass is considered (bytes)
    pub min_chunk_bytes: usize,

    /// Buffer growth factor that forces a pass regardless of elapsed time
    pub double_chunk_factor: usize,

    /// Minimum time between periodic passes (milliseconds)
    pub process_interval_ms: u64,

    /// Quiet time after which a non-empty buffer is flushed and fully reset
    pub silence_threshold_ms: u64,

    /// Quiet time after which the server sends a liveness ping
    pub keepalive_idle_ms: u64,

    /// Receive timeout of the session loop (milliseconds)
    pub poll_window_ms: u64,

    /// Maximum transcription results retained for the session summary
    pub history_limit: usize,
}

/// Transcription engine boundary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Whisper-compatible transcription endpoint (multipart file upload)
    pub endpoint: String,

    /// Upper bound on one transcription pass (milliseconds); a slower pass
    /// is abandoned and its result discarded
    pub request_timeout_ms: u64,

    /// PCM shape used when wrapping buffered audio as WAV for the upload
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// Static credential table for channel acceptance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<AuthTokenEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokenEntry {
    pub token: String,
    pub principal: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            streaming: StreamingConfig::default(),
            engine: EngineConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            min_chunk_bytes: 4096,
            double_chunk_factor: 2,
            process_interval_ms: 1_000,
            silence_threshold_ms: 5_000,
            keepalive_idle_ms: 30_000,
            poll_window_ms: 1_000,
            history_limit: 10,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000/api/v1/stt/transcribe".to_string(),
            request_timeout_ms: 30_000,
            sample_rate: 16_000,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject bare HOST/PORT.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations that cannot possibly work.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }
        if self.streaming.min_chunk_bytes == 0 {
            return Err(anyhow::anyhow!("min_chunk_bytes must be greater than 0"));
        }
        if self.streaming.double_chunk_factor < 1 {
            return Err(anyhow::anyhow!("double_chunk_factor must be at least 1"));
        }
        if self.streaming.poll_window_ms == 0 {
            return Err(anyhow::anyhow!("poll_window_ms must be greater than 0"));
        }
        if self.streaming.history_limit == 0 {
            return Err(anyhow::anyhow!("history_limit must be greater than 0"));
        }
        if self.engine.endpoint.is_empty() {
            return Err(anyhow::anyhow!("engine endpoint must be set"));
        }
        if self.engine.request_timeout_ms == 0 {
            return Err(anyhow::anyhow!("engine request timeout must be greater than 0"));
        }
        // The WAV wrapper reads 16-bit little-endian samples; other widths
        // would produce a header that contradicts the payload.
        if self.engine.bits_per_sample != 16 {
            return Err(anyhow::anyhow!(
                "engine bits_per_sample must be 16 (got {})",
                self.engine.bits_per_sample
            ));
        }
        Ok(())
    }
}

impl StreamingConfig {
    /// Trigger constants in the form the session's evaluator consumes.
    pub fn trigger_config(&self) -> TriggerConfig {
        TriggerConfig {
            min_chunk_bytes: self.min_chunk_bytes,
            double_chunk_factor: self.double_chunk_factor,
            process_interval: Duration::from_millis(self.process_interval_ms),
            silence_threshold: Duration::from_millis(self.silence_threshold_ms),
            keepalive_idle: Duration::from_millis(self.keepalive_idle_ms),
        }
    }

    pub fn poll_window(&self) -> Duration {
        Duration::from_millis(self.poll_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.streaming.min_chunk_bytes, 4096);
        assert_eq!(config.streaming.history_limit, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_catches_broken_values() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.streaming.min_chunk_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.engine.endpoint.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.engine.bits_per_sample = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn trigger_config_converts_milliseconds() {
        let triggers = StreamingConfig::default().trigger_config();
        assert_eq!(triggers.process_interval, Duration::from_secs(1));
        assert_eq!(triggers.silence_threshold, Duration::from_secs(5));
        assert_eq!(triggers.keepalive_idle, Duration::from_secs(30));
    }
}
