//! TOML configuration file loading
//!
//! Supports `~/.config/voice-shell/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::voice::SpeakFlagPolicy;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ShellConfigFile {
    /// Backend endpoints
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Voice mode, wake channel and capture configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Chat dispatch configuration
    #[serde(default)]
    pub chat: ChatFileConfig,
}

/// Backend endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// HTTP base URL (e.g. "http://localhost:8000")
    pub api_url: Option<String>,

    /// Wake word stream URL (e.g. "ws://localhost:8000/ws/wake-word")
    pub wake_word_url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Voice configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Delay before reconnecting the wake word stream
    pub reconnect_delay_ms: Option<u64>,

    /// Grow the reconnect delay exponentially
    pub backoff: Option<bool>,

    /// Upper bound for the reconnect delay when backing off
    pub max_reconnect_delay_ms: Option<u64>,

    /// Give up after this many consecutive failed reconnects
    pub max_reconnect_attempts: Option<u32>,

    /// Capture language tag (e.g. "en-US")
    pub language: Option<String>,

    /// Ask the engine for interim results
    pub interim_results: Option<bool>,

    /// Maximum recognition alternatives
    pub max_alternatives: Option<u32>,

    /// When the `speak` flag is read for voice-originated messages
    pub speak_flag: Option<SpeakFlagPolicy>,

    /// Turn voice mode on at startup
    pub enabled_on_start: Option<bool>,
}

/// Chat dispatch configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// Assistant message appended when the chat call fails
    pub error_message: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ShellConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> ShellConfigFile {
    config_file_path().map_or_else(ShellConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Returns `ShellConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file_from(path: &Path) -> ShellConfigFile {
    if !path.exists() {
        return ShellConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ShellConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ShellConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voice-shell/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-shell").join("config.toml"))
}
