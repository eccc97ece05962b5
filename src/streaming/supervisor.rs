//! Channel supervisor: connect, run, reconnect
//!
//! Owns the WebSocket connection lifecycle. One connection at a time; the
//! sender and receiver run as sibling futures over its split halves and the
//! first failure tears both down. An idle-disconnect from the server is
//! absorbed by reconnecting with capped exponential backoff; any other
//! failure propagates to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{client::IntoClientRequest, http::HeaderValue},
};

use crate::audio::FrameSource;
use crate::conversation::CompletionClient;
use crate::session::SessionState;
use crate::settings::AppSettings;

use super::receiver::run_receiver;
use super::sender::run_sender;
use super::{is_benign_disconnect, StreamError};

/// Connection timeout for the initial WebSocket handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection that stayed up at least this long resets the backoff
/// counter, so a healthy channel that idles out hours later starts over
/// at the base delay.
const BACKOFF_RESET_UPTIME: Duration = Duration::from_secs(30);

/// Read the transcription service API key from the environment.
pub fn transcription_api_key() -> Option<String> {
    std::env::var("ASSEMBLYAI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
}

/// Pong-freshness tracker shared between the sender (which pings and
/// checks) and the receiver (which observes pongs).
///
/// Stores milliseconds since an epoch `Instant` in an atomic so neither
/// task needs a lock on the hot path.
pub struct KeepAlive {
    epoch: Instant,
    last_pong_ms: AtomicU64,
    interval: Duration,
    timeout: Duration,
}

impl KeepAlive {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            last_pong_ms: AtomicU64::new(0),
            interval,
            timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record that a pong arrived.
    pub fn note_pong(&self) {
        let ms = self.epoch.elapsed().as_millis() as u64;
        self.last_pong_ms.store(ms, Ordering::Relaxed);
    }

    /// True once no pong has been seen for longer than the timeout.
    pub fn pong_overdue(&self) -> bool {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let last = self.last_pong_ms.load(Ordering::Relaxed);
        now_ms.saturating_sub(last) > self.timeout.as_millis() as u64
    }
}

/// Run the transcription channel until shutdown or a fatal error.
///
/// Reconnects transparently when the server drops an idle session;
/// returns `Ok(())` only on graceful shutdown.
pub async fn run_channel(
    session: &SessionState,
    settings: &AppSettings,
    frames: &FrameSource,
    completion: &dyn CompletionClient,
    api_key: &str,
) -> Result<(), StreamError> {
    let mut attempt: u32 = 0;

    loop {
        if session.is_shutting_down() {
            return Ok(());
        }

        let (ws, _) = open_channel(&settings.endpoint_url(), api_key).await?;
        log::info!("Transcription channel connected");
        let connected_at = Instant::now();

        let (mut write, mut read) = ws.split();
        let keepalive = KeepAlive::new(settings.ping_interval(), settings.ping_timeout());

        let outcome = tokio::select! {
            _ = session.cancelled() => {
                log::info!("Transcription channel closing for shutdown");
                return Ok(());
            }
            res = async {
                tokio::try_join!(
                    run_sender(session, settings, frames, &mut write, &keepalive),
                    run_receiver(session, settings, completion, &mut read, &keepalive),
                )
            } => res.map(|_| ()),
        };

        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if is_benign_disconnect(&e) => {
                if connected_at.elapsed() >= BACKOFF_RESET_UPTIME {
                    attempt = 1;
                } else {
                    attempt += 1;
                }
                let delay = reconnect_delay(
                    settings.reconnect_base_delay(),
                    settings.reconnect_max_delay(),
                    attempt,
                );
                log::info!(
                    "Idle disconnect ({}), reconnecting in {:?} (attempt {})",
                    e,
                    delay,
                    attempt
                );
                tokio::select! {
                    _ = session.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

async fn open_channel(
    url: &str,
    api_key: &str,
) -> Result<
    (
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        tokio_tungstenite::tungstenite::http::Response<Option<Vec<u8>>>,
    ),
    StreamError,
> {
    let mut request = url
        .into_client_request()
        .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;

    // AssemblyAI expects the raw key, not a Bearer token.
    request.headers_mut().insert(
        "Authorization",
        HeaderValue::from_str(api_key)
            .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?,
    );

    timeout(CONNECT_TIMEOUT, connect_async_with_config(request, None, true))
        .await
        .map_err(|_| StreamError::ConnectionFailed("Connection timeout".to_string()))?
        .map_err(|e| StreamError::ConnectionFailed(e.to_string()))
}

/// Exponential backoff before a reconnect, with jitter so restarts after
/// a shared outage don't land in lockstep.
fn reconnect_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let backoff = backoff_base(base, cap, attempt);
    let jitter_bound = (backoff.as_millis() as u64 / 4).max(1);
    let jitter = rand::thread_rng().gen_range(0..jitter_bound);
    (backoff + Duration::from_millis(jitter)).min(cap)
}

fn backoff_base(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let ms = (base.as_millis() as u64).saturating_mul(1u64 << exp);
    Duration::from_millis(ms).min(cap)
}
