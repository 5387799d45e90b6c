//! # Transcription Engine Boundary
//!
//! The session core treats the engine as an external collaborator: a
//! synchronous function from an audio byte buffer to recognized text. The
//! trait keeps the session loop independent of any particular backend, and
//! the concrete implementation here forwards audio to a Whisper-compatible
//! HTTP service as a multipart WAV upload.
//!
//! ## Sharing:
//! Engines are stateless and `Send + Sync`; one instance is created at
//! startup and shared across all session loops behind an `Arc`, injected at
//! session construction rather than accessed through a global.

use crate::audio::wav::{self, PcmSpec};
use crate::config::EngineConfig;
use anyhow::Result;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Raw output of one engine invocation, before normalization.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    /// Recognized text; empty is a valid result (silence / non-speech)
    pub text: String,

    /// Language the engine detected or was configured for
    pub language: String,
}

/// Failure modes of a transcription pass.
///
/// All of these are recoverable from the session's point of view: the loop
/// surfaces them as an `error` event to the peer and keeps running.
#[derive(Debug)]
pub enum EngineError {
    /// The engine could not be reached or refused the request
    Unavailable(String),

    /// The engine responded with something this service cannot interpret
    Malformed(String),

    /// The bounded invocation window elapsed; the pass was discarded
    Timeout(Duration),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Unavailable(msg) => write!(f, "transcription engine unavailable: {}", msg),
            EngineError::Malformed(msg) => write!(f, "unexpected engine response: {}", msg),
            EngineError::Timeout(limit) => {
                write!(f, "transcription pass exceeded {}ms", limit.as_millis())
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Synchronous transcription backend.
///
/// `transcribe` blocks for the duration of the pass; the invoker runs it on
/// the blocking pool so the session task itself never stalls the runtime.
/// Implementations must accept arbitrary-length buffers.
pub trait TranscriptionEngine: Send + Sync {
    fn transcribe(&self, audio: &[u8]) -> Result<EngineOutput, EngineError>;
}

/// Response body of a Whisper-style `/transcribe` endpoint.
///
/// The service also returns `segments` and timing fields; only the parts the
/// streaming protocol forwards are deserialized here.
#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: String,
}

/// Engine implementation backed by a Whisper-compatible HTTP service.
///
/// Accumulated PCM is wrapped in a WAV container and uploaded as a multipart
/// file, matching the upload contract of the transcription service.
pub struct HttpWhisperEngine {
    client: reqwest::blocking::Client,
    endpoint: String,
    pcm_spec: PcmSpec,
}

impl HttpWhisperEngine {
    /// Build a client for the configured endpoint.
    ///
    /// The HTTP-level timeout is set slightly above the invoker's own bound
    /// so the invoker decides when a pass is abandoned.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms + 500))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            pcm_spec: PcmSpec {
                sample_rate: config.sample_rate,
                channels: config.channels,
                bits_per_sample: config.bits_per_sample,
            },
        })
    }
}

impl TranscriptionEngine for HttpWhisperEngine {
    fn transcribe(&self, audio: &[u8]) -> Result<EngineOutput, EngineError> {
        let wav_bytes = wav::wrap_pcm(audio, self.pcm_spec)
            .map_err(|e| EngineError::Malformed(format!("failed to wrap PCM as WAV: {}", e)))?;

        let part = reqwest::blocking::multipart::Part::bytes(wav_bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| EngineError::Malformed(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Unavailable(format!(
                "engine returned HTTP {}",
                status
            )));
        }

        let body: TranscribeResponse = response
            .json()
            .map_err(|e| EngineError::Malformed(e.to_string()))?;

        Ok(EngineOutput {
            text: body.text,
            language: body.language,
        })
    }
}
