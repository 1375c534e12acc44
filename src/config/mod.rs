//! Configuration management for the voice shell

pub mod file;

use std::time::Duration;

use url::Url;

use crate::voice::{CaptureSettings, ReconnectPolicy, SpeakFlagPolicy};
use crate::{Error, Result};
use file::ShellConfigFile;

/// Default backend base URL
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Path of the wake word notification stream on the backend
pub const WAKE_WORD_STREAM_PATH: &str = "/ws/wake-word";

/// Default assistant message when the chat call fails
pub const DEFAULT_CHAT_ERROR: &str = "Error: Unable to process request. Is the API server running?";

/// Voice shell configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend endpoints
    pub backend: BackendConfig,

    /// Voice mode configuration
    pub voice: VoiceConfig,

    /// Chat dispatch configuration
    pub chat: ChatConfig,
}

/// Backend endpoint configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// HTTP base URL for the chat and wake word control endpoints
    pub api_url: String,

    /// WebSocket URL of the wake word notification stream
    pub wake_word_url: String,

    /// Per-request timeout
    pub timeout: Duration,
}

/// Voice mode configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Wake word stream reconnect policy
    pub reconnect: ReconnectPolicy,

    /// Settings passed to the speech engine on every capture
    pub capture: CaptureSettings,

    /// When the `speak` flag is read for voice-originated messages
    pub speak_flag: SpeakFlagPolicy,

    /// Turn voice mode on at startup
    pub enabled_on_start: bool,
}

/// Chat dispatch configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Assistant message appended when the chat call fails
    pub error_message: String,
}

impl Config {
    /// Load configuration from the environment and the TOML config file
    ///
    /// # Errors
    ///
    /// Returns error if a configured URL is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed config file and an env lookup
    ///
    /// Precedence is env > file > default.
    ///
    /// # Errors
    ///
    /// Returns error if a configured URL is invalid or uses the wrong scheme
    pub fn from_sources<F>(fc: ShellConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = env("VOICE_SHELL_API_URL")
            .or(fc.backend.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = api_url.trim_end_matches('/').to_string();
        validate_scheme(&api_url, &["http", "https"])?;

        let wake_word_url = match env("VOICE_SHELL_WAKE_WORD_URL").or(fc.backend.wake_word_url) {
            Some(url) => url,
            None => derive_wake_word_url(&api_url)?,
        };
        validate_scheme(&wake_word_url, &["ws", "wss"])?;

        let timeout_secs = env("VOICE_SHELL_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .or(fc.backend.timeout_secs)
            .unwrap_or(30);

        let defaults = ReconnectPolicy::default();
        let reconnect = ReconnectPolicy {
            base_delay: env("VOICE_SHELL_RECONNECT_MS")
                .and_then(|s| s.parse().ok())
                .or(fc.voice.reconnect_delay_ms)
                .map_or(defaults.base_delay, Duration::from_millis),
            max_delay: fc
                .voice
                .max_reconnect_delay_ms
                .map_or(defaults.max_delay, Duration::from_millis),
            backoff: fc.voice.backoff.unwrap_or(defaults.backoff),
            max_attempts: fc.voice.max_reconnect_attempts.or(defaults.max_attempts),
        };

        let capture_defaults = CaptureSettings::default();
        let capture = CaptureSettings {
            language: env("VOICE_SHELL_LANGUAGE")
                .or(fc.voice.language)
                .unwrap_or(capture_defaults.language),
            interim_results: fc
                .voice
                .interim_results
                .unwrap_or(capture_defaults.interim_results),
            max_alternatives: fc
                .voice
                .max_alternatives
                .unwrap_or(capture_defaults.max_alternatives),
            continuous: capture_defaults.continuous,
        };

        let enabled_on_start = env("VOICE_SHELL_VOICE_MODE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("on"))
            .or(fc.voice.enabled_on_start)
            .unwrap_or(false);

        Ok(Self {
            backend: BackendConfig {
                api_url,
                wake_word_url,
                timeout: Duration::from_secs(timeout_secs),
            },
            voice: VoiceConfig {
                reconnect,
                capture,
                speak_flag: fc.voice.speak_flag.unwrap_or_default(),
                enabled_on_start,
            },
            chat: ChatConfig {
                error_message: fc
                    .chat
                    .error_message
                    .unwrap_or_else(|| DEFAULT_CHAT_ERROR.to_string()),
            },
        })
    }
}

/// Derive the wake word stream URL from the HTTP base URL
///
/// `http://host:8000` becomes `ws://host:8000/ws/wake-word`; `https` maps to `wss`.
///
/// # Errors
///
/// Returns error if the base URL cannot be parsed
pub fn derive_wake_word_url(api_url: &str) -> Result<String> {
    let mut url = Url::parse(api_url)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| Error::Config(format!("cannot derive stream url from {api_url}")))?;

    let path = format!("{}{WAKE_WORD_STREAM_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);

    Ok(url.to_string())
}

fn validate_scheme(raw: &str, allowed: &[&str]) -> Result<()> {
    let url = Url::parse(raw)?;
    if allowed.contains(&url.scheme()) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "unsupported scheme '{}' in {raw} (expected one of {allowed:?})",
            url.scheme()
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_sources() {
        let config = Config::from_sources(ShellConfigFile::default(), |_| None).unwrap();

        assert_eq!(config.backend.api_url, "http://localhost:8000");
        assert_eq!(config.backend.wake_word_url, "ws://localhost:8000/ws/wake-word");
        assert_eq!(config.backend.timeout, Duration::from_secs(30));
        assert_eq!(config.voice.reconnect.base_delay, Duration::from_millis(3000));
        assert!(!config.voice.reconnect.backoff);
        assert!(config.voice.reconnect.max_attempts.is_none());
        assert_eq!(config.voice.capture.language, "en-US");
        assert_eq!(config.voice.speak_flag, SpeakFlagPolicy::AtDispatch);
        assert!(!config.voice.enabled_on_start);
        assert_eq!(config.chat.error_message, DEFAULT_CHAT_ERROR);
    }

    #[test]
    fn env_overrides_file() {
        let mut fc = ShellConfigFile::default();
        fc.backend.api_url = Some("http://file-host:1234".to_string());
        fc.voice.reconnect_delay_ms = Some(500);

        let env = env_from(&[
            ("VOICE_SHELL_API_URL", "https://env-host/"),
            ("VOICE_SHELL_VOICE_MODE", "on"),
        ]);
        let config = Config::from_sources(fc, env).unwrap();

        assert_eq!(config.backend.api_url, "https://env-host");
        assert_eq!(config.backend.wake_word_url, "wss://env-host/ws/wake-word");
        assert_eq!(config.voice.reconnect.base_delay, Duration::from_millis(500));
        assert!(config.voice.enabled_on_start);
    }

    #[test]
    fn derives_stream_url_under_path_prefix() {
        let url = derive_wake_word_url("http://example.com:8000/assistant/").unwrap();
        assert_eq!(url, "ws://example.com:8000/assistant/ws/wake-word");
    }

    #[test]
    fn rejects_wrong_stream_scheme() {
        let env = env_from(&[("VOICE_SHELL_WAKE_WORD_URL", "http://localhost:8000/ws")]);
        let err = Config::from_sources(ShellConfigFile::default(), env).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_unparsable_api_url() {
        let env = env_from(&[("VOICE_SHELL_API_URL", "not a url")]);
        let err = Config::from_sources(ShellConfigFile::default(), env).unwrap_err();
        assert!(matches!(err, Error::Url(_)));
    }
}
