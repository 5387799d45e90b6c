//! # Chunk Buffer Management
//!
//! Owns the growing byte sequence for one streaming session. Audio arrives in
//! small network-sized binary chunks and is accumulated here until the trigger
//! evaluator decides enough has arrived to hand to the transcription engine.
//!
//! ## Key Behaviors:
//! - **Append**: amortized O(1) growth of an owned byte vector
//! - **Overlap retention**: after a successful pass, keep the trailing half of
//!   the buffer so consecutive passes share acoustic context at the boundary
//! - **Reset**: full clear on `start_recording`, post-stop, and silence flush
//!
//! ## Ownership:
//! One session owns its buffer exclusively and mutates it only from its own
//! loop task, so no locking is needed here.

/// Growable audio byte buffer with truncate-from-front overlap semantics.
#[derive(Debug)]
pub struct ChunkBuffer {
    /// Accumulated raw audio bytes, treated as an opaque sequence
    data: Vec<u8>,

    /// Minimum flushable size in bytes; overlap retention only applies once
    /// the buffer has grown past twice this value
    min_chunk_bytes: usize,
}

impl ChunkBuffer {
    /// Create an empty buffer with the given minimum-chunk threshold.
    pub fn new(min_chunk_bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(min_chunk_bytes * 2),
            min_chunk_bytes,
        }
    }

    /// Append one inbound chunk to the end of the buffer.
    pub fn append(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    /// Current buffer length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer currently holds no audio.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy of the current contents, handed to the transcription invoker.
    ///
    /// The session loop is sequential, so nothing appends while an invocation
    /// is in flight; the copy exists so the engine can run on the blocking
    /// pool without borrowing session state.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.clone()
    }

    /// Trim the buffer to its trailing half after a successful pass.
    ///
    /// Only applies when the buffer has grown past `2 * min_chunk_bytes`;
    /// smaller buffers are left untouched. The retained tail is
    /// `len / 2` bytes (rounded down), which preserves context continuity
    /// across consecutive passes without re-transcribing unbounded history.
    pub fn retain_overlap(&mut self) {
        if self.data.len() > self.min_chunk_bytes * 2 {
            let keep = self.data.len() / 2;
            self.data.drain(..self.data.len() - keep);
        }
    }

    /// Drop all buffered audio.
    ///
    /// Used on `start_recording`, after the `stop_recording` summary, and
    /// after a silence-triggered flush (silence implies an utterance boundary,
    /// so no overlap is carried over).
    pub fn reset(&mut self) {
        self.data.clear();
    }
}
