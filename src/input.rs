//! Keyboard control loop
//!
//! Reads stdin line by line: an empty line toggles listening, `q` or
//! `quit` (or EOF) shuts the whole session down. Toggling off waits a
//! short settle delay first so trailing audio still reaches the
//! recognizer before the sender pauses.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::session::SessionState;

#[derive(Debug, PartialEq, Eq)]
enum InputCommand {
    Toggle,
    Quit,
    Ignored,
}

fn classify_input(line: &str) -> InputCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        InputCommand::Toggle
    } else if trimmed.eq_ignore_ascii_case("q") || trimmed.eq_ignore_ascii_case("quit") {
        InputCommand::Quit
    } else {
        InputCommand::Ignored
    }
}

pub fn spawn_listener(session: Arc<SessionState>, settle: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = session.cancelled() => return,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => match classify_input(&line) {
                        InputCommand::Toggle => {
                            if session.is_active() {
                                // Trailing frames are still in the ring.
                                tokio::time::sleep(settle).await;
                            }
                            session.toggle();
                        }
                        InputCommand::Quit => {
                            session.begin_shutdown();
                            return;
                        }
                        InputCommand::Ignored => {
                            log::debug!("Ignoring input: {:?}", line.trim());
                        }
                    },
                    Ok(None) => {
                        log::info!("Stdin closed, shutting down");
                        session.begin_shutdown();
                        return;
                    }
                    Err(e) => {
                        log::warn!("Stdin read error: {}", e);
                        session.begin_shutdown();
                        return;
                    }
                },
            }
        }
    })
}
