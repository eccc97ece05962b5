//! Conversation state and streaming completion
//!
//! Holds the ordered conversation history that forms the completion request
//! context, and drives the streaming completion call for each finished
//! utterance. Entry 0 of the log is always the system prompt; entries are
//! appended only, never rewritten.

pub mod openai;
mod processor;

pub use processor::process_utterance;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

/// Role tag for a conversation entry, serialized in the wire format the
/// completion service expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One `(role, content)` turn in the conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub content: String,
}

/// Append-only conversation history.
///
/// The system entry is fixed at index 0 for the process lifetime. When a
/// priming note is configured it follows at index 1 as a user entry.
#[derive(Debug)]
pub struct ConversationLog {
    entries: Vec<ChatEntry>,
}

impl ConversationLog {
    pub fn new(system_prompt: &str, priming_note: &str) -> Self {
        let mut entries = vec![ChatEntry {
            role: ChatRole::System,
            content: system_prompt.to_string(),
        }];
        if !priming_note.is_empty() {
            entries.push(ChatEntry {
                role: ChatRole::User,
                content: priming_note.to_string(),
            });
        }
        Self { entries }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.entries.push(ChatEntry {
            role: ChatRole::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.entries.push(ChatEntry {
            role: ChatRole::Assistant,
            content: content.into(),
        });
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }
}

/// Errors from the completion service. All of these are fatal for the run;
/// no local retry exists.
#[derive(Debug, Clone)]
pub enum CompletionError {
    /// OpenAI API key not configured
    MissingApiKey,
    /// Network/HTTP error
    Network(String),
    /// The completion service returned an error
    Api { status: u16, message: String },
    /// Failed to parse the response stream
    Parse(String),
}

impl std::fmt::Display for CompletionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionError::MissingApiKey => {
                write!(
                    f,
                    "OpenAI API key not configured. Set OPENAI_API_KEY environment variable."
                )
            }
            CompletionError::Network(e) => write!(f, "Completion network error: {}", e),
            CompletionError::Api { status, message } => {
                write!(f, "Completion service error ({}): {}", status, message)
            }
            CompletionError::Parse(e) => write!(f, "Failed to parse completion stream: {}", e),
        }
    }
}

impl std::error::Error for CompletionError {}

/// A stream of response text increments. Any increment may be the empty
/// string; the channel closing marks end of stream.
pub type IncrementStream = mpsc::Receiver<Result<String, CompletionError>>;

/// Seam to the completion service, so processing can be driven by a
/// scripted stream in tests.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Start a streaming completion over the given conversation context.
    async fn stream_chat(
        &self,
        model: &str,
        entries: &[ChatEntry],
    ) -> Result<IncrementStream, CompletionError>;
}
