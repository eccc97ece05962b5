//! Integration tests for the end-to-end session flow
//!
//! ## Running Tests
//!
//! ### Local tests (no API key needed):
//! ```bash
//! cargo test --test session_flow
//! ```
//!
//! ### Live test (requires API key):
//! ```bash
//! export OPENAI_API_KEY=sk-your-key
//! cargo test --test session_flow live_
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parley::audio::FrameSource;
use parley::conversation::{ChatEntry, ChatRole, CompletionClient, CompletionError, IncrementStream};
use parley::streaming::{handle_transcript_text, run_channel, StreamError};
use parley::{AppSettings, SessionState};

/// Completion client that replays a fixed increment script.
struct ScriptedClient {
    calls: AtomicUsize,
    increments: Vec<&'static str>,
}

impl ScriptedClient {
    fn new(increments: Vec<&'static str>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            increments,
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn stream_chat(
        &self,
        _model: &str,
        entries: &[ChatEntry],
    ) -> Result<IncrementStream, CompletionError> {
        assert_eq!(entries[0].role, ChatRole::System);
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = tokio::sync::mpsc::channel(self.increments.len().max(1));
        for inc in &self.increments {
            tx.send(Ok(inc.to_string())).await.unwrap();
        }
        Ok(rx)
    }
}

fn final_event(text: &str) -> String {
    format!(r#"{{"message_type":"FinalTranscript","text":"{}"}}"#, text)
}

#[tokio::test]
async fn test_spoken_turn_becomes_user_and_assistant_entries() {
    let settings = AppSettings::default();
    let session = SessionState::new(&settings);
    let client = ScriptedClient::new(vec!["Hi", "", " back"]);
    let seeded = session.conversation.lock().unwrap().len();

    // Speak: three finals arrive while listening.
    session.toggle();
    for text in ["Hello ", "there", "."] {
        handle_transcript_text(&session, &settings, &client, &final_event(text))
            .await
            .unwrap();
    }
    assert_eq!(client.call_count(), 0, "no processing while listening");
    assert_eq!(session.transcript.lock().unwrap().text(), "Hello there.");

    // Pause; the next final (empty here) completes the utterance.
    session.toggle();
    handle_transcript_text(&session, &settings, &client, &final_event(""))
        .await
        .unwrap();

    assert_eq!(client.call_count(), 1);
    assert!(session.transcript.lock().unwrap().is_empty());

    let conversation = session.conversation.lock().unwrap();
    assert_eq!(conversation.len(), seeded + 2);
    let user = &conversation.entries()[seeded];
    assert_eq!(user.role, ChatRole::User);
    assert_eq!(user.content, "Hello there.");
    let assistant = &conversation.entries()[seeded + 1];
    assert_eq!(assistant.role, ChatRole::Assistant);
    assert_eq!(assistant.content, "Hi back");
}

#[tokio::test]
async fn test_second_turn_sees_full_history() {
    let settings = AppSettings::default();
    let session = SessionState::new(&settings);
    let client = ScriptedClient::new(vec!["Sure."]);
    let seeded = session.conversation.lock().unwrap().len();

    for utterance in ["First question.", "Second question."] {
        session.toggle();
        handle_transcript_text(&session, &settings, &client, &final_event(utterance))
            .await
            .unwrap();
        session.toggle();
        handle_transcript_text(&session, &settings, &client, &final_event(""))
            .await
            .unwrap();
    }

    assert_eq!(client.call_count(), 2);
    let conversation = session.conversation.lock().unwrap();
    assert_eq!(conversation.len(), seeded + 4);
    assert_eq!(conversation.entries()[seeded].content, "First question.");
    assert_eq!(conversation.entries()[seeded + 2].content, "Second question.");
}

#[tokio::test]
async fn test_garbage_from_service_never_fails_the_channel() {
    let settings = AppSettings::default();
    let session = SessionState::new(&settings);
    let client = ScriptedClient::new(vec![]);

    for raw in ["", "garbage", r#"{"message_type":42}"#, r#"[1,2,3]"#] {
        handle_transcript_text(&session, &settings, &client, raw)
            .await
            .unwrap();
    }
    assert_eq!(client.call_count(), 0);
}

mod reconnect {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    /// Accept one connection and close it with the given reason.
    async fn serve_one(listener: &tokio::net::TcpListener, code: CloseCode, reason: &str) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(tokio_tungstenite::tungstenite::Message::Close(Some(
            CloseFrame {
                code,
                reason: reason.to_string().into(),
            },
        )))
        .await
        .unwrap();
        while let Some(msg) = ws.next().await {
            if msg.is_err() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_idle_disconnect_reconnects_once_then_fatal_close_ends_run() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            serve_one(
                &listener,
                CloseCode::Library(4031),
                "Session idle for too long, closing connection",
            )
            .await;
            serve_one(&listener, CloseCode::Normal, "done").await;
        });

        let settings = AppSettings {
            transcription_endpoint: format!("ws://{}", addr),
            reconnect_base_delay_ms: 10,
            reconnect_max_delay_ms: 50,
            ..AppSettings::default()
        };
        let session = SessionState::new(&settings);
        let frames = FrameSource::new(settings.frame_samples, settings.sample_rate as usize);
        let client = ScriptedClient::new(vec![]);

        let result = run_channel(&session, &settings, &frames, &client, "test-key").await;

        // The idle close was absorbed; the second, ordinary close is fatal.
        match result {
            Err(StreamError::Disconnected(detail)) => {
                assert!(detail.contains("done"), "unexpected detail: {}", detail)
            }
            other => panic!("Expected fatal disconnect, got {:?}", other),
        }

        // Both connections were consumed, so exactly one reconnect happened.
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_ends_channel_cleanly() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(msg) = ws.next().await {
                if msg.is_err() {
                    break;
                }
            }
        });

        let settings = AppSettings {
            transcription_endpoint: format!("ws://{}", addr),
            ..AppSettings::default()
        };
        let session = Arc::new(SessionState::new(&settings));
        let frames = FrameSource::new(settings.frame_samples, settings.sample_rate as usize);
        let client = ScriptedClient::new(vec![]);

        let canceller = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                session.begin_shutdown();
            })
        };

        let result = run_channel(&session, &settings, &frames, &client, "test-key").await;
        assert!(result.is_ok());
        canceller.await.unwrap();
    }
}

mod live_tests {
    use super::*;
    use parley::conversation::openai::OpenAiClient;

    #[tokio::test]
    async fn live_completion_streams_a_reply() {
        if std::env::var("OPENAI_API_KEY").is_err() {
            eprintln!("Skipping live completion test: OPENAI_API_KEY not set");
            return;
        }

        let entries = vec![
            ChatEntry {
                role: ChatRole::System,
                content: "Reply with a single short sentence.".to_string(),
            },
            ChatEntry {
                role: ChatRole::User,
                content: "Say hello.".to_string(),
            },
        ];

        let client = OpenAiClient;
        let mut stream = client.stream_chat("gpt-4o-mini", &entries).await.unwrap();

        let mut reply = String::new();
        while let Some(item) = stream.recv().await {
            reply.push_str(&item.unwrap());
        }
        assert!(!reply.trim().is_empty());
    }
}
