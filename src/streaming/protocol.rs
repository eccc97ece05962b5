//! Transcription channel wire format
//!
//! JSON message types for the AssemblyAI real-time WebSocket API.
//!
//! # Protocol Overview
//!
//! 1. Connect to `wss://api.assemblyai.com/v2/realtime/ws?sample_rate=16000`
//!    with the API key in the `Authorization` header
//! 2. Receive `SessionBegins`
//! 3. Stream audio as `{"audio_data": "<base64 PCM16>"}` messages
//! 4. Receive `PartialTranscript` events while speech is recognized,
//!    `FinalTranscript` once a span stabilizes
//! 5. The server closes idle sessions with a close reason containing
//!    "Session idle for too long"

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// Close/error text the server uses for inactivity disconnects. Matching
/// on it is what separates a benign reconnect from a fatal error.
pub const IDLE_DISCONNECT_MARKER: &str = "Session idle for too long";

/// Outbound audio message carrying one frame of base64-encoded PCM16.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioMessage {
    pub audio_data: String,
}

impl AudioMessage {
    /// Encode one frame of raw PCM16 samples (little-endian byte order).
    pub fn from_samples(samples: &[i16]) -> Self {
        let bytes: Vec<u8> = samples.iter().flat_map(|&s| s.to_le_bytes()).collect();
        Self {
            audio_data: STANDARD.encode(&bytes),
        }
    }
}

/// Inbound events from the transcription service.
///
/// Unknown message types deserialize to `Unknown` so future server-side
/// additions never break the receive loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "message_type")]
pub enum TranscriptEvent {
    /// Session established; the server is ready for audio
    SessionBegins {
        #[serde(default)]
        session_id: String,
    },

    /// Interim recognition for a span still being spoken
    PartialTranscript {
        #[serde(default)]
        text: String,
    },

    /// Stabilized recognition result for a span of audio
    FinalTranscript {
        #[serde(default)]
        text: String,
    },

    /// Server acknowledged session termination
    SessionTerminated,

    /// Catch-all for message types we don't handle
    #[serde(other)]
    Unknown,
}

impl TranscriptEvent {
    /// Extract the text if this is a final-type event.
    pub fn final_text(&self) -> Option<&str> {
        match self {
            TranscriptEvent::FinalTranscript { text } => Some(text),
            _ => None,
        }
    }
}
