//! # Audio Module
//!
//! Byte-level audio handling for the streaming transcription session.
//!
//! ## Key Components:
//! - **Chunk Buffer**: owned growable buffer with overlap retention
//! - **WAV helper**: PCM-to-WAV wrapping required at the engine boundary
//!
//! The session treats audio as an opaque byte sequence; nothing in this
//! module decodes or resamples it.

pub mod buffer;
pub mod wav;
