//! # Transcription Module
//!
//! The boundary between the streaming session and the external speech
//! recognition engine.
//!
//! ## Key Components:
//! - **Engine trait**: synchronous `bytes -> text` collaborator, shared
//!   across sessions
//! - **HTTP engine**: forwards accumulated audio to a Whisper-compatible
//!   service as a multipart WAV upload
//! - **Invoker**: bounded-time invocation on the blocking pool, result
//!   normalization, failure isolation

pub mod engine;
pub mod invoker;

pub use engine::{EngineError, EngineOutput, HttpWhisperEngine, TranscriptionEngine};
pub use invoker::{TranscriptionInvoker, TranscriptionResult};
