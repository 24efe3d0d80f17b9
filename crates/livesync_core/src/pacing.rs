//! Typewriter pacing for streamed text.
//!
//! The buffer is tick-driven: the owner runs a fixed-interval timer while
//! [`PacingBuffer::is_draining`] is true and calls [`PacingBuffer::tick`] on
//! every beat. Text leaves in strict arrival order and is never dropped unless
//! the buffer is cancelled.
use std::collections::VecDeque;

use crate::MessageId;

pub const DEFAULT_CHUNK_CHARS: usize = 3;

/// Text released on one tick for one message record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drained {
    pub message: MessageId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    message: MessageId,
    chars: VecDeque<char>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingBuffer {
    segments: VecDeque<Segment>,
    chunk_chars: usize,
    draining: bool,
    sealed: bool,
}

impl Default for PacingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_CHARS)
    }
}

impl PacingBuffer {
    pub fn new(chunk_chars: usize) -> Self {
        Self {
            segments: VecDeque::new(),
            chunk_chars: chunk_chars.max(1),
            draining: false,
            sealed: false,
        }
    }

    /// Queues text for `message`. Returns true when the drain loop must be started.
    pub fn push(&mut self, message: MessageId, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        match self.segments.back_mut() {
            Some(segment) if segment.message == message => segment.chars.extend(text.chars()),
            _ => self.segments.push_back(Segment {
                message,
                chars: text.chars().collect(),
            }),
        }
        if self.draining {
            false
        } else {
            self.draining = true;
            true
        }
    }

    /// Releases up to `chunk_chars` characters from the head of the queue.
    ///
    /// A slice that crosses a message boundary is split so each piece lands in
    /// its own message record. Draining stops once the queue is empty.
    pub fn tick(&mut self) -> Vec<Drained> {
        let mut drained: Vec<Drained> = Vec::new();
        let mut budget = self.chunk_chars;
        while budget > 0 {
            let Some(segment) = self.segments.front_mut() else {
                break;
            };
            let take = budget.min(segment.chars.len());
            let text: String = segment.chars.drain(..take).collect();
            budget -= take;
            let message = segment.message;
            if segment.chars.is_empty() {
                self.segments.pop_front();
            }
            if text.is_empty() {
                continue;
            }
            match drained.last_mut() {
                Some(last) if last.message == message => last.text.push_str(&text),
                _ => drained.push(Drained { message, text }),
            }
        }
        if self.segments.is_empty() {
            self.draining = false;
        }
        drained
    }

    /// Clears the queue and halts draining. Returns the number of discarded characters.
    pub fn cancel(&mut self) -> usize {
        let discarded = self.pending_chars();
        self.segments.clear();
        self.draining = false;
        discarded
    }

    /// Marks the upstream as finished; the buffer still drains what it holds.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sealed and fully drained: the owner may drop it.
    pub fn is_finished(&self) -> bool {
        self.sealed && self.segments.is_empty()
    }

    pub fn pending_chars(&self) -> usize {
        self.segments.iter().map(|segment| segment.chars.len()).sum()
    }
}
