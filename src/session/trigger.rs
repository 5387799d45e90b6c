//! # Trigger Evaluation
//!
//! Pure decision logic for when a session should flush its buffer to the
//! transcription engine. Two tiers:
//!
//! - **Chunk tier**: evaluated after every inbound chunk. Fires once the
//!   buffer holds at least one minimum chunk and either the process interval
//!   has elapsed or the buffer has grown to a double chunk. This bounds
//!   worst-case per-segment latency to the process interval and worst-case
//!   unprocessed audio to two minimum chunks.
//! - **Idle tier**: evaluated on every poll-window timeout (no message
//!   received). Detects silence (flush whatever is left, then full reset)
//!   and long idleness (liveness ping), guaranteeing forward progress even
//!   when the producer goes quiet mid-utterance.
//!
//! All size comparisons against the minimum-chunk threshold are non-strict
//! (`>=`); idle-tier time comparisons are strict (`>`).

use std::time::Duration;

/// Constants governing both trigger tiers.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Minimum buffer size before a chunk-tier flush is considered (bytes)
    pub min_chunk_bytes: usize,

    /// Buffer size multiplier that forces a flush regardless of elapsed time
    pub double_chunk_factor: usize,

    /// Minimum elapsed time between chunk-tier flushes
    pub process_interval: Duration,

    /// Quiet time after which a non-empty buffer is treated as a finished
    /// utterance and flushed with a full reset
    pub silence_threshold: Duration,

    /// Quiet time after which the session sends a liveness ping
    pub keepalive_idle: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            min_chunk_bytes: 4096,
            double_chunk_factor: 2,
            process_interval: Duration::from_secs(1),
            silence_threshold: Duration::from_secs(5),
            keepalive_idle: Duration::from_secs(30),
        }
    }
}

/// Outcome of the chunk-tier evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkDecision {
    /// Flush the buffer to the engine now
    ProcessNow,
    /// Not enough data or too soon; keep accumulating
    Wait,
}

/// Outcome of the idle-tier evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleDecision {
    /// Flush the remaining buffer, then fully reset it
    SilenceFlush,
    /// Send a liveness ping; the buffer is untouched
    KeepalivePing,
    /// Nothing to do this tick
    Wait,
}

/// Evaluate the chunk tier after an inbound chunk has been appended.
pub fn evaluate_chunk(
    buffer_len: usize,
    since_process: Duration,
    config: &TriggerConfig,
) -> ChunkDecision {
    if buffer_len < config.min_chunk_bytes {
        return ChunkDecision::Wait;
    }
    if since_process >= config.process_interval
        || buffer_len >= config.min_chunk_bytes * config.double_chunk_factor
    {
        return ChunkDecision::ProcessNow;
    }
    ChunkDecision::Wait
}

/// Evaluate the idle tier on a poll-window timeout.
pub fn evaluate_idle(
    buffer_len: usize,
    since_chunk: Duration,
    config: &TriggerConfig,
) -> IdleDecision {
    if since_chunk > config.silence_threshold && buffer_len > 0 {
        return IdleDecision::SilenceFlush;
    }
    if since_chunk > config.keepalive_idle {
        return IdleDecision::KeepalivePing;
    }
    IdleDecision::Wait
}
