//! Voice-driven conversation assistant
//!
//! Captures microphone audio, streams it to a real-time transcription
//! service over a persistent WebSocket, and feeds each completed utterance
//! to a streaming chat completion. The operator gates listening with a
//! keyboard toggle; replies print to stdout as they stream in.

pub mod audio;
pub mod conversation;
pub mod input;
pub mod session;
pub mod settings;
pub mod streaming;

pub use session::SessionState;
pub use settings::AppSettings;

use std::sync::Arc;

use audio::CaptureConfig;
use conversation::openai::OpenAiClient;
use streaming::StreamError;

/// Run the assistant until the operator quits or a fatal error occurs.
pub async fn run(settings: AppSettings) -> Result<(), Box<dyn std::error::Error>> {
    let api_key = streaming::transcription_api_key().ok_or(StreamError::MissingApiKey)?;

    let session = Arc::new(SessionState::new(&settings));

    let capture_config = CaptureConfig {
        target_sample_rate: settings.sample_rate,
        frame_samples: settings.frame_samples,
    };
    // The handle keeps the capture thread alive for the whole run.
    let (_capture, frames) = audio::start_capture(&capture_config)?;

    let input_task = input::spawn_listener(Arc::clone(&session), settings.toggle_settle());

    session::emit("Ready. Press Enter to toggle listening, q to quit.\n");

    let completion = OpenAiClient;
    let result = streaming::run_channel(&session, &settings, &frames, &completion, &api_key).await;

    session.begin_shutdown();
    let _ = input_task.await;

    result.map_err(Into::into)
}
