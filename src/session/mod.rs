//! # Streaming Session Module
//!
//! Everything that makes up the real-time transcription session: the pure
//! trigger evaluator, the bounded transcript history, the wire protocol, and
//! the session state machine that composes them. The loop driving a session
//! lives in `websocket.rs`.

pub mod events;
pub mod history;
pub mod session;
pub mod trigger;

pub use events::{ControlCommand, ServerEvent};
pub use session::{SessionState, StreamSession};
