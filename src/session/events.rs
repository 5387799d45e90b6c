//! # Session Wire Protocol
//!
//! Inbound control tokens and outbound structured events for the streaming
//! channel.
//!
//! ## Message Format:
//! - **Client -> Server**: binary frames carry opaque audio bytes; text
//!   frames carry a single control token (`start_recording`,
//!   `stop_recording`, `ping`)
//! - **Server -> Client**: JSON events tagged with a `type` field, emitted
//!   on the single outbound channel in production order

use crate::transcription::TranscriptionResult;
use serde::Serialize;

/// Parsed inbound control token.
///
/// Tokens are trimmed and ASCII-lowercased before matching, so
/// `" START_RECORDING "` and `start_recording` are the same command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    StartRecording,
    StopRecording,
    Ping,
    /// Blank frame; silently ignored
    Empty,
    /// Anything else; logged and ignored, never fatal
    Unknown(String),
}

impl ControlCommand {
    pub fn parse(raw: &str) -> Self {
        let token = raw.trim().to_ascii_lowercase();
        match token.as_str() {
            "" => ControlCommand::Empty,
            "start_recording" => ControlCommand::StartRecording,
            "stop_recording" => ControlCommand::StopRecording,
            "ping" => ControlCommand::Ping,
            _ => ControlCommand::Unknown(token),
        }
    }
}

/// Transcription fields shared by the partial / final / silence events.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptPayload {
    pub text: String,
    pub language: String,
    pub processing_time_ms: u64,
    pub buffer_size: usize,
    pub timestamp: u64,
    /// Operational diagnostic, not part of the stable contract
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<String>,
}

impl From<&TranscriptionResult> for TranscriptPayload {
    fn from(result: &TranscriptionResult) -> Self {
        Self {
            text: result.text.clone(),
            language: result.language.clone(),
            processing_time_ms: result.processing_time_ms,
            buffer_size: result.buffer_size,
            timestamp: result.produced_at,
            debug_info: result.debug_note.clone(),
        }
    }
}

/// Outbound event on the streaming channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Channel accepted and identity verified; first event of every session
    Connected {
        session_id: String,
        principal: String,
    },

    /// Lightweight per-chunk acknowledgement, emitted before any trigger
    /// evaluation so the peer has flow visibility independent of
    /// transcription latency
    ChunkReceived {
        chunk_size: usize,
        total_size: u64,
    },

    /// Result of a periodic (chunk-tier) pass
    PartialTranscription(TranscriptPayload),

    /// Result of the forced pass on `stop_recording`
    FinalTranscription(TranscriptPayload),

    /// Result of a silence-triggered flush
    SilenceTranscription(TranscriptPayload),

    /// Acknowledgement of `start_recording`
    RecordingStarted,

    /// Summary emitted after `stop_recording`
    SessionComplete {
        full_text: String,
        total_segments: usize,
    },

    /// Reply to a client `ping` token
    Pong,

    /// Server-initiated liveness signal after long idleness
    Ping,

    /// Recoverable failure surfaced to the peer; the session continues
    Error { message: String },
}
