//! Streaming completion for one finished utterance
//!
//! The caller awaits this to completion before handling the next utterance,
//! so at most one completion is in flight at a time.

use crate::session::{emit, SessionState};
use crate::settings::AppSettings;

use super::{CompletionClient, CompletionError};

/// Stream a completion over the current conversation and append the reply.
///
/// Non-empty increments are printed as they arrive; the assistant entry is
/// the concatenation of every increment, empty ones included. A mid-stream
/// failure appends nothing and propagates.
pub async fn process_utterance(
    session: &SessionState,
    settings: &AppSettings,
    client: &dyn CompletionClient,
) -> Result<(), CompletionError> {
    // Clone the context out so no lock is held across the streaming await.
    let entries = {
        let conversation = session.conversation.lock().unwrap();
        conversation.entries().to_vec()
    };

    let mut stream = client.stream_chat(&settings.model, &entries).await?;

    let mut reply = String::new();
    let mut labeled = false;
    while let Some(item) = stream.recv().await {
        let increment = item?;
        if !increment.is_empty() {
            if !labeled {
                emit(&format!("{}: ", settings.assistant_name));
                labeled = true;
            }
            emit(&increment);
        }
        reply.push_str(&increment);
    }
    if labeled {
        emit("\n");
    }

    log::info!("Completion finished ({} chars)", reply.len());
    session.conversation.lock().unwrap().push_assistant(reply);
    Ok(())
}
