//! Utterance accumulation for the transcript receiver
//!
//! Collects finalized transcript fragments into one utterance. The buffer
//! is non-empty only between the first fragment and the handoff that takes
//! the text for conversation processing.

/// Accumulates final transcript fragments into a single utterance.
#[derive(Debug, Clone, Default)]
pub struct TranscriptBuffer {
    text: String,
    fragment_count: u64,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finalized fragment. Empty fragments are ignored.
    /// Returns the accumulated text.
    pub fn push_final(&mut self, fragment: &str) -> &str {
        if !fragment.is_empty() {
            self.text.push_str(fragment);
            self.fragment_count += 1;

            log::debug!(
                "TranscriptBuffer: {} fragments, {} chars accumulated",
                self.fragment_count,
                self.text.len()
            );
        }
        &self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn fragment_count(&self) -> u64 {
        self.fragment_count
    }

    /// Hand off the accumulated utterance, leaving the buffer empty.
    pub fn take(&mut self) -> String {
        self.fragment_count = 0;
        std::mem::take(&mut self.text)
    }
}
