//! Transcript receiver task
//!
//! Reads the transcription channel, accumulates finalized transcript text,
//! and hands completed utterances to the conversation processor. An
//! utterance is complete when a final transcript event arrives while the
//! toggle is paused and the buffer holds text.

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::conversation::{process_utterance, CompletionClient};
use crate::session::{emit, SessionState};
use crate::settings::AppSettings;

use super::protocol::TranscriptEvent;
use super::supervisor::KeepAlive;
use super::StreamError;

pub(crate) async fn run_receiver<R>(
    session: &SessionState,
    settings: &AppSettings,
    completion: &dyn CompletionClient,
    read: &mut R,
    keepalive: &KeepAlive,
) -> Result<(), StreamError>
where
    R: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = session.cancelled() => return Ok(()),
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_transcript_text(session, settings, completion, &text).await?;
                }
                Some(Ok(Message::Pong(_))) => keepalive.note_pong(),
                // tungstenite queues the pong reply itself
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{}: {}", f.code, f.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    return Err(StreamError::Disconnected(reason));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(StreamError::ProtocolError(e.to_string())),
                None => return Err(StreamError::Disconnected("stream ended".to_string())),
            },
        }
    }
}

/// Process one text message from the transcription channel.
///
/// Malformed messages are dropped without failing the channel; the service
/// occasionally interleaves payloads we don't model.
pub async fn handle_transcript_text(
    session: &SessionState,
    settings: &AppSettings,
    completion: &dyn CompletionClient,
    raw: &str,
) -> Result<(), StreamError> {
    let event: TranscriptEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(e) => {
            log::debug!("Ignoring malformed transcription message: {}", e);
            return Ok(());
        }
    };

    match event {
        TranscriptEvent::SessionBegins { session_id } => {
            log::info!("Transcription session started: {}", session_id);
        }
        TranscriptEvent::PartialTranscript { text } => {
            if !text.is_empty() {
                log::debug!("Partial: {}", text);
            }
        }
        TranscriptEvent::FinalTranscript { text } => {
            {
                let mut buffer = session.transcript.lock().unwrap();
                buffer.push_final(&text);
            }
            // The final that arrives after toggling off (even an empty one)
            // is what completes the utterance.
            if !session.is_active() {
                finish_utterance(session, settings, completion).await?;
            }
        }
        TranscriptEvent::SessionTerminated => {
            log::info!("Transcription session terminated");
        }
        TranscriptEvent::Unknown => {}
    }

    Ok(())
}

async fn finish_utterance(
    session: &SessionState,
    settings: &AppSettings,
    completion: &dyn CompletionClient,
) -> Result<(), StreamError> {
    let text = {
        let mut buffer = session.transcript.lock().unwrap();
        if buffer.is_empty() {
            return Ok(());
        }
        buffer.take()
    };

    emit(&format!("\n{}: {}\n", settings.user_name, text));
    session.conversation.lock().unwrap().push_user(text);

    process_utterance(session, settings, completion)
        .await
        .map_err(|e| StreamError::Completion(e.to_string()))
}
