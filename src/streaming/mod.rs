//! Streaming orchestration for real-time transcription
//!
//! This module owns the persistent WebSocket to the transcription service
//! and the two concurrent tasks multiplexed over it: the audio sender and
//! the transcript receiver.
//!
//! # Architecture
//!
//! ```text
//! FrameSource ──▶ sender ──┐
//!                          ├── one WebSocket, supervised ──▶ receiver
//!            pings/audio ──┘                                    │
//!                                                               ▼
//!                                             TranscriptBuffer ──▶ processor
//! ```
//!
//! The supervisor reconnects transparently (with capped backoff) when the
//! server drops an idle session; every other channel failure is fatal.

pub mod protocol;
mod receiver;
mod sender;
mod supervisor;
mod transcript;

pub use receiver::handle_transcript_text;
pub use supervisor::{run_channel, transcription_api_key, KeepAlive};
pub use transcript::TranscriptBuffer;

use protocol::IDLE_DISCONNECT_MARKER;

/// Errors that can occur on the transcription channel
#[derive(Debug, Clone)]
pub enum StreamError {
    /// Transcription API key not configured
    MissingApiKey,
    /// Failed to establish the WebSocket connection
    ConnectionFailed(String),
    /// WebSocket protocol error
    ProtocolError(String),
    /// Connection was closed by the peer
    Disconnected(String),
    /// Failed to send audio data
    SendFailed(String),
    /// The completion service failed while processing an utterance
    Completion(String),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::MissingApiKey => {
                write!(
                    f,
                    "Transcription API key not configured. Set ASSEMBLYAI_API_KEY environment variable."
                )
            }
            StreamError::ConnectionFailed(e) => {
                write!(f, "Failed to connect to transcription service: {}", e)
            }
            StreamError::ProtocolError(e) => write!(f, "WebSocket protocol error: {}", e),
            StreamError::Disconnected(e) => write!(f, "WebSocket disconnected: {}", e),
            StreamError::SendFailed(e) => write!(f, "Failed to send audio: {}", e),
            StreamError::Completion(e) => write!(f, "Completion failed: {}", e),
        }
    }
}

impl std::error::Error for StreamError {}

/// Whether a channel failure is the server's inactivity disconnect, which
/// the supervisor absorbs by reconnecting. Everything else is fatal.
pub fn is_benign_disconnect(err: &StreamError) -> bool {
    match err {
        StreamError::Disconnected(detail) | StreamError::ProtocolError(detail) => {
            detail.contains(IDLE_DISCONNECT_MARKER)
        }
        _ => false,
    }
}
