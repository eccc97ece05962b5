use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILE_NAME: &str = "settings.json";
const APP_DIR_NAME: &str = "parley";

/// AssemblyAI real-time transcription endpoint (query carries the sample rate).
pub const DEFAULT_TRANSCRIPTION_ENDPOINT: &str = "wss://api.assemblyai.com/v2/realtime/ws";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// WebSocket endpoint for the transcription service (without query string).
    pub transcription_endpoint: String,

    /// Sample rate the transcription service expects, in Hz.
    pub sample_rate: u32,

    /// Samples per audio frame. One frame is sent per message.
    pub frame_samples: usize,

    /// Sleep between send cycles. Also bounds toggle-to-effect latency.
    pub send_interval_ms: u64,

    /// Keep-alive ping interval for the transcription channel.
    pub ping_interval_secs: u64,

    /// Maximum time without a pong before the channel is considered dead.
    pub ping_timeout_secs: u64,

    /// Base delay before the first reconnect after an idle-disconnect.
    pub reconnect_base_delay_ms: u64,

    /// Upper bound on the reconnect delay.
    pub reconnect_max_delay_ms: u64,

    /// Delay between the toggle-off keystroke and pausing, so trailing
    /// audio frames still reach the recognizer.
    pub toggle_settle_ms: u64,

    /// Completion model identifier.
    pub model: String,

    /// System prompt, always entry 0 of the conversation.
    pub system_prompt: String,

    /// Fixed user note appended right after the system prompt. Empty
    /// string disables it.
    pub priming_note: String,

    /// Label printed before the operator's transcribed turns.
    pub user_name: String,

    /// Label printed before the assistant's streamed replies.
    pub assistant_name: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            transcription_endpoint: DEFAULT_TRANSCRIPTION_ENDPOINT.to_string(),
            sample_rate: 16_000,
            frame_samples: 3200,
            send_interval_ms: 10,
            ping_interval_secs: 5,
            ping_timeout_secs: 20,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            toggle_settle_ms: 300,
            model: "gpt-4o-mini".to_string(),
            system_prompt: "You are a helpful assistant in a spoken conversation. \
                            Keep replies brief and conversational."
                .to_string(),
            priming_note: "The user's messages are transcribed from live speech, \
                           so they may contain recognition errors. Answer the \
                           intended question."
                .to_string(),
            user_name: "You".to_string(),
            assistant_name: "Assistant".to_string(),
        }
    }
}

impl AppSettings {
    /// Full endpoint URL including the sample-rate query parameter.
    pub fn endpoint_url(&self) -> String {
        format!("{}?sample_rate={}", self.transcription_endpoint, self.sample_rate)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub fn toggle_settle(&self) -> Duration {
        Duration::from_millis(self.toggle_settle_ms)
    }
}

fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;
    Ok(dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

pub fn load_settings() -> AppSettings {
    let path = match settings_path() {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Settings: {}", e);
            return AppSettings::default();
        }
    };
    load_from(&path)
}

fn load_from(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(settings: &AppSettings) -> Result<(), String> {
    let path = settings_path()?;
    save_to(&path, settings)
}

fn save_to(path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write atomically: write to a temp file in the same directory, then rename.
    // This prevents partial/corrupt settings.json if the process dies mid-write.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // On Unix, rename will atomically replace the destination. On Windows, rename
    // fails if the destination exists, so we remove it first (ignoring NotFound).
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}
