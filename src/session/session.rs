//! # Streaming Session Core
//!
//! One [`StreamSession`] per accepted channel. The session owns the chunk
//! buffer, transcript history, and trigger timestamps; all mutation happens
//! from the single loop task in `websocket.rs`, which feeds inbound frames
//! and idle ticks into the handlers here and ships the returned events to
//! the peer in order.
//!
//! ## Lifecycle:
//! `AwaitingAuth -> Active -> Stopping -> Closed`, linear. The session is
//! created after identity verification, activated with a `connected` event,
//! and torn down when the channel closes. No state outlives the channel.
//!
//! ## Failure policy:
//! Engine failures become `error` events and the session continues; only
//! auth rejection (before activation) and transport failure end a session.

use crate::audio::buffer::ChunkBuffer;
use crate::auth::Identity;
use crate::session::events::{ControlCommand, ServerEvent, TranscriptPayload};
use crate::session::history::TranscriptHistory;
use crate::session::trigger::{
    evaluate_chunk, evaluate_idle, ChunkDecision, IdleDecision, TriggerConfig,
};
use crate::transcription::TranscriptionInvoker;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle state of one session. Linear, no cycles back to `AwaitingAuth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingAuth,
    Active,
    Stopping,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::AwaitingAuth => "awaiting_auth",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
            SessionState::Closed => "closed",
        }
    }
}

/// Kind of transcription event a flush produces.
#[derive(Debug, Clone, Copy)]
enum FlushKind {
    Partial,
    Final,
    Silence,
}

/// State and behavior of one streaming transcription session.
pub struct StreamSession {
    id: String,
    identity: Identity,
    state: SessionState,
    buffer: ChunkBuffer,
    history: TranscriptHistory,
    invoker: TranscriptionInvoker,
    triggers: TriggerConfig,

    /// When the last chunk arrived; drives the silence / keepalive tier
    last_chunk_at: Instant,

    /// When the last transcription pass started; drives the periodic tier
    last_process_at: Instant,

    /// When the last server-initiated ping went out; throttles keepalives
    /// to one per idle window despite the 1s poll granularity
    last_keepalive_at: Instant,

    /// Cumulative audio bytes received since session start or the last
    /// `start_recording`; reported in chunk acknowledgements
    bytes_received: u64,
}

impl StreamSession {
    pub fn new(
        identity: Identity,
        invoker: TranscriptionInvoker,
        triggers: TriggerConfig,
        history_limit: usize,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            buffer: ChunkBuffer::new(triggers.min_chunk_bytes),
            history: TranscriptHistory::new(history_limit),
            identity,
            state: SessionState::AwaitingAuth,
            invoker,
            triggers,
            last_chunk_at: now,
            last_process_at: now,
            last_keepalive_at: now,
            bytes_received: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transition `AwaitingAuth -> Active` and emit the `connected`
    /// acknowledgement. A no-op in any other state.
    pub fn activate(&mut self) -> Vec<ServerEvent> {
        if self.state != SessionState::AwaitingAuth {
            return Vec::new();
        }
        self.state = SessionState::Active;
        info!(
            session_id = %self.id,
            principal = %self.identity.principal,
            "streaming session active"
        );
        vec![ServerEvent::Connected {
            session_id: self.id.clone(),
            principal: self.identity.principal.clone(),
        }]
    }

    /// Handle one inbound binary chunk.
    ///
    /// The acknowledgement is produced before trigger evaluation, so it
    /// always precedes any transcription event caused by the same chunk.
    pub async fn on_chunk(&mut self, chunk: &[u8]) -> Vec<ServerEvent> {
        if self.state != SessionState::Active {
            debug!(session_id = %self.id, state = self.state.as_str(), "chunk ignored");
            return Vec::new();
        }

        self.buffer.append(chunk);
        self.bytes_received += chunk.len() as u64;
        self.last_chunk_at = Instant::now();

        let mut events = vec![ServerEvent::ChunkReceived {
            chunk_size: chunk.len(),
            total_size: self.bytes_received,
        }];

        let decision = evaluate_chunk(
            self.buffer.len(),
            self.last_process_at.elapsed(),
            &self.triggers,
        );
        if decision == ChunkDecision::ProcessNow {
            let event = self.flush(FlushKind::Partial).await;
            let transcribed = !matches!(&event, ServerEvent::Error { .. });
            events.push(event);
            // Overlap trimming only after audio actually made it into a
            // result; a failed pass keeps the buffer whole for retry.
            if transcribed {
                self.buffer.retain_overlap();
            }
        }

        events
    }

    /// Handle one inbound control token.
    pub async fn on_control(&mut self, raw: &str) -> Vec<ServerEvent> {
        if self.state != SessionState::Active {
            return Vec::new();
        }

        match ControlCommand::parse(raw) {
            ControlCommand::StartRecording => {
                let now = Instant::now();
                self.buffer.reset();
                self.history.clear();
                self.last_chunk_at = now;
                self.last_process_at = now;
                self.bytes_received = 0;
                info!(session_id = %self.id, "recording started");
                vec![ServerEvent::RecordingStarted]
            }
            ControlCommand::StopRecording => {
                let mut events = Vec::new();
                // A stop flushes whatever is buffered, below the minimum
                // threshold or not; the peer asked for a final transcript.
                if !self.buffer.is_empty() {
                    events.push(self.flush(FlushKind::Final).await);
                }
                events.push(ServerEvent::SessionComplete {
                    full_text: self.history.full_text(),
                    total_segments: self.history.len(),
                });
                info!(
                    session_id = %self.id,
                    segments = self.history.len(),
                    "recording stopped"
                );
                self.buffer.reset();
                self.history.clear();
                events
            }
            ControlCommand::Ping => vec![ServerEvent::Pong],
            ControlCommand::Empty => Vec::new(),
            ControlCommand::Unknown(token) => {
                debug!(session_id = %self.id, token = %token, "unrecognized control token");
                Vec::new()
            }
        }
    }

    /// Run the idle-tier checks after a poll window passed with no message.
    pub async fn on_idle(&mut self) -> Vec<ServerEvent> {
        if self.state != SessionState::Active {
            return Vec::new();
        }

        match evaluate_idle(
            self.buffer.len(),
            self.last_chunk_at.elapsed(),
            &self.triggers,
        ) {
            IdleDecision::SilenceFlush => {
                debug!(
                    session_id = %self.id,
                    buffered = self.buffer.len(),
                    "silence detected, flushing remaining audio"
                );
                let event = self.flush(FlushKind::Silence).await;
                // Silence marks the end of an utterance: full reset, no
                // overlap carried into whatever comes next.
                self.buffer.reset();
                vec![event]
            }
            IdleDecision::KeepalivePing => {
                if self.last_keepalive_at.elapsed() > self.triggers.keepalive_idle {
                    self.last_keepalive_at = Instant::now();
                    vec![ServerEvent::Ping]
                } else {
                    Vec::new()
                }
            }
            IdleDecision::Wait => Vec::new(),
        }
    }

    /// Transition towards `Closed` on channel shutdown. Idempotent.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Stopping;
        info!(
            session_id = %self.id,
            bytes_received = self.bytes_received,
            segments = self.history.len(),
            "streaming session closing"
        );
        self.state = SessionState::Closed;
    }

    /// Run one transcription pass over the current buffer snapshot and turn
    /// the outcome into exactly one event. The buffer itself is left for the
    /// caller to trim or reset; history and the process timestamp are
    /// updated here.
    async fn flush(&mut self, kind: FlushKind) -> ServerEvent {
        let snapshot = self.buffer.snapshot();
        let outcome = self.invoker.run(snapshot).await;
        // Updated on failure too, so a broken engine is retried at the
        // process-interval cadence instead of on every chunk.
        self.last_process_at = Instant::now();

        match outcome {
            Ok(result) => {
                let payload = TranscriptPayload::from(&result);
                self.history.push(result);
                match kind {
                    FlushKind::Partial => ServerEvent::PartialTranscription(payload),
                    FlushKind::Final => ServerEvent::FinalTranscription(payload),
                    FlushKind::Silence => ServerEvent::SilenceTranscription(payload),
                }
            }
            Err(err) => {
                warn!(session_id = %self.id, error = %err, "transcription pass failed");
                ServerEvent::Error {
                    message: err.to_string(),
                }
            }
        }
    }

    #[cfg(test)]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    #[cfg(test)]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::engine::{EngineError, EngineOutput, TranscriptionEngine};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct ScriptedEngine {
        text: String,
        calls: AtomicUsize,
        fail: bool,
    }

    impl ScriptedEngine {
        fn speaking(text: &str) -> Arc<Self> {
            Arc::new(Self {
                text: text.to_string(),
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                text: String::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    impl TranscriptionEngine for ScriptedEngine {
        fn transcribe(&self, _audio: &[u8]) -> Result<EngineOutput, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EngineError::Unavailable("engine down".to_string()));
            }
            Ok(EngineOutput {
                text: self.text.clone(),
                language: "en".to_string(),
            })
        }
    }

    fn session_with(engine: Arc<ScriptedEngine>, triggers: TriggerConfig) -> StreamSession {
        let invoker = TranscriptionInvoker::new(engine, Duration::from_secs(5));
        let mut session = StreamSession::new(
            Identity {
                principal: "alice".to_string(),
            },
            invoker,
            triggers,
            10,
        );
        session.activate();
        session
    }

    fn active_session(engine: Arc<ScriptedEngine>) -> StreamSession {
        session_with(engine, TriggerConfig::default())
    }

    #[test]
    fn activation_emits_connected_exactly_once() {
        let engine = ScriptedEngine::speaking("hi");
        let invoker = TranscriptionInvoker::new(engine, Duration::from_secs(5));
        let mut session = StreamSession::new(
            Identity {
                principal: "alice".to_string(),
            },
            invoker,
            TriggerConfig::default(),
            10,
        );
        assert_eq!(session.state(), SessionState::AwaitingAuth);

        let events = session.activate();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::Connected { .. }));
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.activate().is_empty());
    }

    #[tokio::test]
    async fn small_chunk_is_acked_but_not_processed() {
        let engine = ScriptedEngine::speaking("hi");
        let mut session = active_session(engine.clone());

        let events = session.on_chunk(&[0u8; 1000]).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::ChunkReceived {
                chunk_size,
                total_size,
            } => {
                assert_eq!(*chunk_size, 1000);
                assert_eq!(*total_size, 1000);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.buffer_len(), 1000);
    }

    #[tokio::test]
    async fn double_chunk_triggers_immediate_pass_with_overlap_retention() {
        let engine = ScriptedEngine::speaking("segment one");
        let mut session = active_session(engine.clone());

        let events = session.on_chunk(&[0u8; 9000]).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ServerEvent::ChunkReceived { .. }));
        match &events[1] {
            ServerEvent::PartialTranscription(payload) => {
                assert_eq!(payload.text, "segment one");
                assert_eq!(payload.buffer_size, 9000);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.history_len(), 1);
        // Overlap: trailing half of 9000 bytes retained.
        assert_eq!(session.buffer_len(), 4500);
    }

    #[tokio::test]
    async fn ack_always_precedes_transcription_for_the_same_chunk() {
        let engine = ScriptedEngine::speaking("ordered");
        let mut session = active_session(engine);

        let events = session.on_chunk(&[0u8; 10000]).await;
        assert!(matches!(events[0], ServerEvent::ChunkReceived { .. }));
        assert!(matches!(events[1], ServerEvent::PartialTranscription(_)));
    }

    #[tokio::test]
    async fn engine_failure_becomes_error_event_and_session_survives() {
        let engine = ScriptedEngine::failing();
        let mut session = active_session(engine.clone());

        let events = session.on_chunk(&[0u8; 9000]).await;
        assert!(matches!(events[1], ServerEvent::Error { .. }));
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.history_len(), 0);

        // The session still accepts and acks audio afterwards.
        let events = session.on_chunk(&[0u8; 10]).await;
        assert!(matches!(events[0], ServerEvent::ChunkReceived { .. }));
    }

    #[tokio::test]
    async fn failed_pass_leaves_the_buffer_untrimmed() {
        let engine = ScriptedEngine::failing();
        let mut session = active_session(engine.clone());

        let events = session.on_chunk(&[0u8; 9000]).await;
        assert!(matches!(events[1], ServerEvent::Error { .. }));
        // Nothing was transcribed, so nothing may be discarded; the full
        // buffer stays for the next attempt.
        assert_eq!(session.buffer_len(), 9000);

        // Once the engine recovers, the retried pass covers all of it and
        // overlap trimming resumes.
        let recovered = ScriptedEngine::speaking("caught up");
        session.invoker = TranscriptionInvoker::new(recovered, Duration::from_secs(5));
        let events = session.on_chunk(&[0u8; 100]).await;
        match &events[1] {
            ServerEvent::PartialTranscription(payload) => {
                assert_eq!(payload.buffer_size, 9100);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(session.buffer_len(), 4550);
    }

    #[tokio::test]
    async fn stop_with_empty_buffer_emits_empty_summary_only() {
        let engine = ScriptedEngine::speaking("hi");
        let mut session = active_session(engine.clone());

        let events = session.on_control("stop_recording").await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::SessionComplete {
                full_text,
                total_segments,
            } => {
                assert_eq!(full_text, "");
                assert_eq!(*total_segments, 0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn stop_flushes_below_threshold_and_resets_everything() {
        let engine = ScriptedEngine::speaking("tail");
        let mut session = active_session(engine.clone());

        // 100 bytes is far below min_chunk_bytes, but stop flushes anyway.
        session.on_chunk(&[0u8; 100]).await;
        let events = session.on_control("stop_recording").await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ServerEvent::FinalTranscription(_)));
        match &events[1] {
            ServerEvent::SessionComplete {
                full_text,
                total_segments,
            } => {
                assert_eq!(full_text, "tail");
                assert_eq!(*total_segments, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(session.buffer_len(), 0);
        assert_eq!(session.history_len(), 0);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn summary_joins_history_texts_with_single_spaces() {
        let engine = ScriptedEngine::speaking("word");
        let mut session = active_session(engine);

        session.on_chunk(&[0u8; 9000]).await;
        session.on_chunk(&[0u8; 9000]).await;
        let events = session.on_control("stop_recording").await;
        // Two periodic passes plus the forced final pass.
        match events.last().unwrap() {
            ServerEvent::SessionComplete {
                full_text,
                total_segments,
            } => {
                assert_eq!(full_text, "word word word");
                assert_eq!(*total_segments, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn start_recording_clears_pending_history_and_buffer() {
        let engine = ScriptedEngine::speaking("stale");
        let mut session = active_session(engine);

        for _ in 0..3 {
            session.on_chunk(&[0u8; 9000]).await;
        }
        assert_eq!(session.history_len(), 3);
        assert!(session.buffer_len() > 0);

        let events = session.on_control("start_recording").await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::RecordingStarted));
        assert_eq!(session.history_len(), 0);
        assert_eq!(session.buffer_len(), 0);

        // The cumulative counter restarts with the new recording.
        let events = session.on_chunk(&[0u8; 50]).await;
        match &events[0] {
            ServerEvent::ChunkReceived { total_size, .. } => assert_eq!(*total_size, 50),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn ping_is_idempotent_and_touches_nothing() {
        let engine = ScriptedEngine::speaking("hi");
        let mut session = active_session(engine);

        session.on_chunk(&[0u8; 500]).await;
        for _ in 0..5 {
            let events = session.on_control("ping").await;
            assert_eq!(events.len(), 1);
            assert!(matches!(events[0], ServerEvent::Pong));
        }
        assert_eq!(session.buffer_len(), 500);
        assert_eq!(session.history_len(), 0);
    }

    #[tokio::test]
    async fn unknown_and_empty_tokens_are_ignored() {
        let engine = ScriptedEngine::speaking("hi");
        let mut session = active_session(engine);

        assert!(session.on_control("resume_session").await.is_empty());
        assert!(session.on_control("   ").await.is_empty());
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn silence_flush_processes_then_fully_resets() {
        let engine = ScriptedEngine::speaking("last words");
        // Zero silence threshold: any idle tick after a chunk counts as
        // silence without sleeping in the test.
        let triggers = TriggerConfig {
            silence_threshold: Duration::ZERO,
            ..TriggerConfig::default()
        };
        let mut session = session_with(engine.clone(), triggers);

        session.on_chunk(&[0u8; 300]).await;
        let events = session.on_idle().await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::SilenceTranscription(payload) => {
                assert_eq!(payload.text, "last words");
                assert_eq!(payload.buffer_size, 300);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        // Full reset, not overlap retention.
        assert_eq!(session.buffer_len(), 0);
        assert_eq!(session.history_len(), 1);
    }

    #[tokio::test]
    async fn idle_tick_with_empty_buffer_does_nothing_before_keepalive() {
        let engine = ScriptedEngine::speaking("hi");
        let mut session = active_session(engine.clone());

        assert!(session.on_idle().await.is_empty());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn long_idle_emits_throttled_keepalive_ping() {
        let engine = ScriptedEngine::speaking("hi");
        let triggers = TriggerConfig {
            keepalive_idle: Duration::ZERO,
            ..TriggerConfig::default()
        };
        let mut session = session_with(engine, triggers);

        let events = session.on_idle().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::Ping));
    }

    #[tokio::test]
    async fn keepalive_ping_is_suppressed_within_the_idle_window() {
        let engine = ScriptedEngine::speaking("hi");
        let triggers = TriggerConfig {
            keepalive_idle: Duration::from_millis(25),
            ..TriggerConfig::default()
        };
        let mut session = session_with(engine, triggers);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let events = session.on_idle().await;
        assert!(matches!(events[0], ServerEvent::Ping));

        // The next poll-window tick lands inside the same idle window and
        // must not produce a second ping.
        assert!(session.on_idle().await.is_empty());

        // A full window later the ping fires again.
        tokio::time::sleep(Duration::from_millis(40)).await;
        let events = session.on_idle().await;
        assert!(matches!(events[0], ServerEvent::Ping));
    }

    #[tokio::test]
    async fn history_is_capped_at_limit_with_fifo_eviction() {
        let engine = ScriptedEngine::speaking("seg");
        let mut session = active_session(engine);

        for _ in 0..14 {
            // Each double-sized chunk forces a pass.
            session.on_chunk(&[0u8; 9000]).await;
        }
        assert_eq!(session.history_len(), 10);
    }

    #[tokio::test]
    async fn empty_text_results_are_recorded_with_diagnostics() {
        let engine = ScriptedEngine::speaking("");
        let mut session = active_session(engine);

        let events = session.on_chunk(&[0u8; 9000]).await;
        match &events[1] {
            ServerEvent::PartialTranscription(payload) => {
                assert_eq!(payload.text, "");
                assert_eq!(payload.debug_info.as_deref(), Some("no speech detected"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        // "No speech" is still a segment, distinct from "not yet processed".
        assert_eq!(session.history_len(), 1);
    }

    #[tokio::test]
    async fn closed_session_ignores_all_input() {
        let engine = ScriptedEngine::speaking("hi");
        let mut session = active_session(engine.clone());
        session.shutdown();
        assert_eq!(session.state(), SessionState::Closed);

        assert!(session.on_chunk(&[0u8; 9000]).await.is_empty());
        assert!(session.on_control("ping").await.is_empty());
        assert!(session.on_idle().await.is_empty());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }
}
