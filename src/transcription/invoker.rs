//! # Transcription Invoker
//!
//! Bridges the sequential session loop and the blocking engine: hands a
//! buffer snapshot to the engine on the blocking pool, bounds the invocation
//! in time, and normalizes the engine's output into a session-level
//! [`TranscriptionResult`].
//!
//! ## Isolation:
//! Engine failures never escape as panics or session teardown; they come
//! back as [`EngineError`] values the session converts into `error` events.
//! A pass that outlives the time bound is abandoned (its result discarded)
//! rather than being allowed to wedge the session.

use crate::transcription::engine::{EngineError, TranscriptionEngine};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// One normalized transcription pass, immutable once produced.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TranscriptionResult {
    /// Recognized text; may be empty for silence or non-speech audio
    pub text: String,

    /// Language reported by the engine
    pub language: String,

    /// Wall-clock time the pass took (milliseconds)
    pub processing_time_ms: u64,

    /// Buffer length in bytes at the moment of capture
    pub buffer_size: usize,

    /// Unix timestamp in milliseconds when the result was produced
    pub produced_at: u64,

    /// Diagnostic annotation, set when `text` is empty so "no speech
    /// detected" stays distinguishable from "not yet processed"
    pub debug_note: Option<String>,
}

/// Runs engine passes on behalf of one session.
#[derive(Clone)]
pub struct TranscriptionInvoker {
    engine: Arc<dyn TranscriptionEngine>,
    invoke_timeout: Duration,
}

impl TranscriptionInvoker {
    pub fn new(engine: Arc<dyn TranscriptionEngine>, invoke_timeout: Duration) -> Self {
        Self {
            engine,
            invoke_timeout,
        }
    }

    /// Transcribe one buffer snapshot.
    ///
    /// The engine call runs on the blocking pool; this future resolves when
    /// the pass completes or the time bound elapses. The caller awaits it
    /// inline, which is what keeps at most one invocation in flight per
    /// session.
    pub async fn run(&self, snapshot: Vec<u8>) -> Result<TranscriptionResult, EngineError> {
        let buffer_size = snapshot.len();
        let started = Instant::now();

        let engine = Arc::clone(&self.engine);
        let pass = tokio::task::spawn_blocking(move || engine.transcribe(&snapshot));

        let output = match tokio::time::timeout(self.invoke_timeout, pass).await {
            Err(_) => {
                warn!(
                    buffer_size,
                    timeout_ms = self.invoke_timeout.as_millis() as u64,
                    "transcription pass abandoned after timeout"
                );
                return Err(EngineError::Timeout(self.invoke_timeout));
            }
            Ok(Err(join_err)) => {
                return Err(EngineError::Unavailable(format!(
                    "engine task failed: {}",
                    join_err
                )));
            }
            Ok(Ok(result)) => result?,
        };

        let text = output.text.trim().to_string();
        let debug_note = if text.is_empty() {
            Some("no speech detected".to_string())
        } else {
            None
        };

        Ok(TranscriptionResult {
            text,
            language: output.language,
            processing_time_ms: started.elapsed().as_millis() as u64,
            buffer_size,
            produced_at: chrono::Utc::now().timestamp_millis() as u64,
            debug_note,
        })
    }
}
