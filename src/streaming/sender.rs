//! Audio sender task
//!
//! Pulls PCM16 frames from the capture ring and writes them to the
//! transcription channel while the toggle is active. Also owns the
//! keep-alive pings; the receiver records the pongs.

use futures_util::{Sink, SinkExt};
use tokio_tungstenite::tungstenite::Message;

use crate::audio::FrameSource;
use crate::session::SessionState;
use crate::settings::AppSettings;

use super::protocol::AudioMessage;
use super::supervisor::KeepAlive;
use super::StreamError;

pub(crate) async fn run_sender<S>(
    session: &SessionState,
    settings: &AppSettings,
    frames: &FrameSource,
    write: &mut S,
    keepalive: &KeepAlive,
) -> Result<(), StreamError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let mut last_ping = tokio::time::Instant::now();

    loop {
        if session.is_shutting_down() {
            return Ok(());
        }

        if keepalive.pong_overdue() {
            return Err(StreamError::Disconnected(
                "keep-alive timeout: no pong from server".to_string(),
            ));
        }

        if last_ping.elapsed() >= keepalive.interval() {
            write
                .send(Message::Ping(Vec::new()))
                .await
                .map_err(|e| StreamError::SendFailed(e.to_string()))?;
            last_ping = tokio::time::Instant::now();
        }

        // An underfilled ring is normal right after toggling on; just try
        // again next cycle.
        if session.is_active() {
            if let Some(samples) = frames.read_frame() {
                write
                    .send(encode_frame(&samples)?)
                    .await
                    .map_err(|e| StreamError::SendFailed(e.to_string()))?;
            }
        }

        tokio::time::sleep(settings.send_interval()).await;
    }
}

fn encode_frame(samples: &[i16]) -> Result<Message, StreamError> {
    let msg = AudioMessage::from_samples(samples);
    let json = serde_json::to_string(&msg).map_err(|e| StreamError::SendFailed(e.to_string()))?;
    Ok(Message::Text(json))
}
