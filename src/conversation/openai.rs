//! OpenAI chat completions client (streaming)
//!
//! Sends the conversation as a `stream: true` chat completion and forwards
//! each SSE delta as one text increment over a channel. The channel closing
//! marks the end of the reply.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{ChatEntry, CompletionClient, CompletionError, IncrementStream};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Connect timeout only. A total-request timeout would cut off long
/// streamed replies.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

fn http_client() -> &'static Client {
    HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client")
    })
}

fn completion_api_key() -> Result<String, CompletionError> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or(CompletionError::MissingApiKey)
}

/// Error body shape for non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct OpenAiClient;

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn stream_chat(
        &self,
        model: &str,
        entries: &[ChatEntry],
    ) -> Result<IncrementStream, CompletionError> {
        let api_key = completion_api_key()?;

        let body = json!({
            "model": model,
            "messages": entries,
            "stream": true,
        });

        let response = http_client()
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(CompletionError::Network(e.to_string()))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE events are newline-delimited; a chunk may split a line.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim_end_matches('\r').to_string();
                    buffer.drain(..=pos);

                    match classify_sse_line(&line) {
                        SseLine::Increment(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                return;
                            }
                        }
                        SseLine::Done => return,
                        SseLine::Malformed(detail) => {
                            let _ = tx.send(Err(CompletionError::Parse(detail))).await;
                            return;
                        }
                        SseLine::Ignored => {}
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    /// One delta, possibly empty (role-only or finish chunks carry no text)
    Increment(String),
    Done,
    Malformed(String),
    Ignored,
}

fn classify_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data: ") else {
        return SseLine::Ignored;
    };
    if data.trim() == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(chunk) => {
            let content = chunk["choices"][0]["delta"]["content"]
                .as_str()
                .unwrap_or("");
            SseLine::Increment(content.to_string())
        }
        Err(e) => SseLine::Malformed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_content_becomes_increment() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"index":0}]}"#;
        assert_eq!(
            classify_sse_line(line),
            SseLine::Increment("Hello".to_string())
        );
    }

    #[test]
    fn test_chunk_without_content_is_empty_increment() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"},"index":0}]}"#;
        assert_eq!(classify_sse_line(line), SseLine::Increment(String::new()));

        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(classify_sse_line(line), SseLine::Increment(String::new()));
    }

    #[test]
    fn test_done_sentinel() {
        assert_eq!(classify_sse_line("data: [DONE]"), SseLine::Done);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        assert_eq!(classify_sse_line(""), SseLine::Ignored);
        assert_eq!(classify_sse_line(": keep-alive"), SseLine::Ignored);
        assert_eq!(classify_sse_line("event: message"), SseLine::Ignored);
    }

    #[test]
    fn test_malformed_data_line() {
        assert!(matches!(
            classify_sse_line("data: {not json"),
            SseLine::Malformed(_)
        ));
    }

    #[test]
    fn test_api_error_body_parsing() {
        let body = r#"{"error":{"message":"Invalid API key","type":"auth_error"}}"#;
        let parsed: ApiErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "Invalid API key");
    }
}
