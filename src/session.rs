//! Shared session state
//!
//! One `SessionState` exists per run, shared by the sender, receiver, and
//! input listener. The toggle and shutdown flags are atomics because the
//! tasks are scheduled on a multi-threaded runtime; the transcript buffer
//! and conversation log are mutex-wrapped for the same reason, though each
//! has a single logical writer at any time.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::conversation::ConversationLog;
use crate::settings::AppSettings;
use crate::streaming::TranscriptBuffer;

pub struct SessionState {
    /// Toggle flag. Single writer: the input listener.
    active: AtomicBool,
    shutdown: CancellationToken,
    pub transcript: Mutex<TranscriptBuffer>,
    pub conversation: Mutex<ConversationLog>,
}

impl SessionState {
    pub fn new(settings: &AppSettings) -> Self {
        Self {
            active: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            transcript: Mutex::new(TranscriptBuffer::new()),
            conversation: Mutex::new(ConversationLog::new(
                &settings.system_prompt,
                &settings.priming_note,
            )),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Flip the toggle and emit a status line. Returns the new state.
    pub fn toggle(&self) -> bool {
        let now_active = !self.active.fetch_xor(true, Ordering::SeqCst);
        if now_active {
            log::info!("Toggle: active");
            emit("\nlistening...\n");
        } else {
            log::info!("Toggle: paused");
            emit("\nprocessing...\n");
        }
        now_active
    }

    /// Signal shutdown. Set once, never cleared.
    pub fn begin_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            log::info!("Shutdown requested");
            self.shutdown.cancel();
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Completes when shutdown has been signaled.
    pub async fn cancelled(&self) {
        self.shutdown.cancelled().await;
    }
}

/// Write to the output surface with immediate flush. Stdout carries only
/// conversation output and status lines; diagnostics go to stderr.
pub(crate) fn emit(text: &str) {
    let mut out = std::io::stdout();
    let _ = out.write_all(text.as_bytes());
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session() -> SessionState {
        SessionState::new(&AppSettings::default())
    }

    #[test]
    fn test_starts_paused() {
        let session = test_session();
        assert!(!session.is_active());
        assert!(!session.is_shutting_down());
    }

    #[test]
    fn test_toggle_flips_both_ways() {
        let session = test_session();
        assert!(session.toggle());
        assert!(session.is_active());
        assert!(!session.toggle());
        assert!(!session.is_active());
    }

    #[test]
    fn test_shutdown_is_sticky() {
        let session = test_session();
        session.begin_shutdown();
        session.begin_shutdown();
        assert!(session.is_shutting_down());
    }

    #[test]
    fn test_conversation_seeded_with_system_and_priming() {
        let session = test_session();
        let conv = session.conversation.lock().unwrap();
        assert_eq!(
            conv.entries()[0].role,
            crate::conversation::ChatRole::System
        );
        assert_eq!(conv.entries()[1].role, crate::conversation::ChatRole::User);
    }
}
