//! Bounded FIFO history of transcription results for one session.
//!
//! Holds at most the N most recent results (oldest evicted first) and exists
//! only to build the final session summary; it is cleared on
//! `start_recording` and after the `stop_recording` summary.

use crate::transcription::TranscriptionResult;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct TranscriptHistory {
    entries: VecDeque<TranscriptionResult>,
    limit: usize,
}

impl TranscriptHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Append a result, evicting the oldest entry when at capacity.
    pub fn push(&mut self, result: TranscriptionResult) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Texts of all retained entries joined by a single space, in insertion
    /// order. Empty texts are included; they are valid results.
    pub fn full_text(&self) -> String {
        self.entries
            .iter()
            .map(|entry| entry.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
