//! Speech capture session
//!
//! One session wraps one engine capture and resolves to exactly one
//! [`SpeechResult`]. Sessions are single-use.

use std::fmt;
use std::sync::Arc;

use super::engine::{CaptureSettings, EngineEvent, SpeechEngine};
use crate::chat::{ChatHistory, ChatSender, EntryId};

/// Transient history line shown while a session is listening
pub const LISTENING_PLACEHOLDER: &str = "🎤 Listening... Speak now.";

/// Why a session failed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Engine reported that it heard no speech
    NoSpeech,
    /// Capture ended on its own without a usable final segment
    ///
    /// Surfaces as the `no-speech` code but is not announced to the user.
    NothingHeard,
    /// Capture was aborted
    Aborted,
    /// No audio input device could be used
    AudioCapture,
    /// Microphone permission denied
    NotAllowed,
    /// Recognition service unreachable
    Network,
    /// No speech capture capability on this system
    Unsupported,
    /// Another session is already listening
    AlreadyActive,
    /// Engine refused to start
    StartFailed,
    /// Any other engine error code
    Other(String),
}

/// Broad class of a failure, which decides how it is remedied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Terminal; the platform lacks speech capture
    CapabilityAbsent,
    /// The user may simply retry
    TransientCapture,
    /// Needs an OS-level permission or device change
    Permission,
    /// Trigger dropped because a session is running
    Rejected,
    /// Engine-specific failure
    Engine,
}

impl ErrorKind {
    /// Map an engine error code to a kind; unknown codes become `Other`
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "audio-capture" => Self::AudioCapture,
            "not-allowed" => Self::NotAllowed,
            "network" => Self::Network,
            "unsupported" => Self::Unsupported,
            "already-active" => Self::AlreadyActive,
            "start-failed" => Self::StartFailed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Stable error code
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::NoSpeech | Self::NothingHeard => "no-speech",
            Self::Aborted => "aborted",
            Self::AudioCapture => "audio-capture",
            Self::NotAllowed => "not-allowed",
            Self::Network => "network",
            Self::Unsupported => "unsupported",
            Self::AlreadyActive => "already-active",
            Self::StartFailed => "start-failed",
            Self::Other(code) => code,
        }
    }

    /// Message shown to the user in the chat history
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NoSpeech => "No speech detected. Please try again and speak clearly.".to_string(),
            Self::NothingHeard => "Nothing was heard.".to_string(),
            Self::Aborted => "Voice input was cancelled.".to_string(),
            Self::AudioCapture => {
                "No microphone found. Please check your microphone settings.".to_string()
            }
            Self::NotAllowed => {
                "Microphone access denied. Please allow microphone permissions.".to_string()
            }
            Self::Network => "Network error. Please check your internet connection.".to_string(),
            Self::Unsupported => "Speech recognition is not supported on this system.".to_string(),
            Self::AlreadyActive => "Already listening.".to_string(),
            Self::StartFailed => "Failed to start voice recognition.".to_string(),
            Self::Other(code) => format!("Voice error: {code}"),
        }
    }

    /// Whether the failure is reported in the chat history
    ///
    /// A capture that simply ends without speech leaves no trace.
    #[must_use]
    pub const fn is_announced(&self) -> bool {
        !matches!(self, Self::NothingHeard)
    }

    /// Failure class
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Unsupported => ErrorCategory::CapabilityAbsent,
            Self::NoSpeech | Self::NothingHeard | Self::Aborted | Self::Network => {
                ErrorCategory::TransientCapture
            }
            Self::NotAllowed | Self::AudioCapture => ErrorCategory::Permission,
            Self::AlreadyActive => ErrorCategory::Rejected,
            Self::StartFailed | Self::Other(_) => ErrorCategory::Engine,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Terminal outcome of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechResult {
    /// Final transcript, trimmed and non-empty
    Completed {
        /// Recognized text
        transcript: String,
    },
    /// Capture failed
    Failed {
        /// Failure reason
        reason: ErrorKind,
    },
}

impl SpeechResult {
    /// Whether the session produced a transcript
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Transcript, if any
    #[must_use]
    pub fn transcript(&self) -> Option<&str> {
        match self {
            Self::Completed { transcript } => Some(transcript),
            Self::Failed { .. } => None,
        }
    }

    const fn failed(reason: ErrorKind) -> Self {
        Self::Failed { reason }
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not started
    Idle,
    /// Engine running
    Listening,
    /// Engine ended, transcript being assembled
    Finalizing,
    /// Resolved with a transcript
    Completed(String),
    /// Resolved with a failure
    Failed(ErrorKind),
}

impl SessionState {
    /// Whether the session holds the engine
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Listening | Self::Finalizing)
    }

    /// Whether the session has resolved
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

/// One bounded speech capture attempt
pub struct SpeechSession {
    engine: Option<Arc<dyn SpeechEngine>>,
    settings: CaptureSettings,
    history: ChatHistory,
    state: SessionState,
}

impl fmt::Debug for SpeechSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechSession")
            .field("supported", &self.engine.is_some())
            .field("settings", &self.settings)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SpeechSession {
    /// Create a session
    ///
    /// `engine` is `None` when the platform has no speech capture capability.
    #[must_use]
    pub fn new(
        engine: Option<Arc<dyn SpeechEngine>>,
        settings: CaptureSettings,
        history: ChatHistory,
    ) -> Self {
        Self {
            engine,
            settings,
            history,
            state: SessionState::Idle,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the capture to completion
    ///
    /// Appends the listening placeholder while the engine runs and removes
    /// exactly that entry before resolving. Interim segments are discarded;
    /// final segments are concatenated. Never fails: every error becomes a
    /// `SpeechResult::Failed`.
    pub async fn start(&mut self) -> SpeechResult {
        if self.state != SessionState::Idle {
            tracing::warn!(state = ?self.state, "speech session is single-use");
            return SpeechResult::failed(ErrorKind::AlreadyActive);
        }

        let Some(engine) = self.engine.clone() else {
            tracing::info!("speech capture unsupported on this system");
            return self.resolve(None, SpeechResult::failed(ErrorKind::Unsupported));
        };

        let placeholder = self.history.push(ChatSender::Assistant, LISTENING_PLACEHOLDER);
        self.state = SessionState::Listening;

        let mut events = match engine.start(&self.settings) {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(error = %e, "speech engine failed to start");
                return self.resolve(Some(placeholder), SpeechResult::failed(ErrorKind::StartFailed));
            }
        };

        tracing::debug!(language = %self.settings.language, "speech session listening");

        let mut transcript = String::new();
        let mut has_final = false;

        loop {
            match events.recv().await {
                Some(EngineEvent::Results(segments)) => {
                    for segment in segments.into_iter().filter(|s| s.is_final) {
                        transcript.push_str(&segment.text);
                        has_final = true;
                    }
                }
                Some(EngineEvent::Error(code)) => {
                    let reason = ErrorKind::from_code(&code);
                    tracing::info!(reason = %reason, "speech engine reported error");
                    return self.resolve(Some(placeholder), SpeechResult::failed(reason));
                }
                Some(EngineEvent::End) | None => break,
            }
        }

        self.state = SessionState::Finalizing;

        let transcript = transcript.trim();
        let result = if has_final && !transcript.is_empty() {
            SpeechResult::Completed {
                transcript: transcript.to_string(),
            }
        } else {
            SpeechResult::failed(ErrorKind::NothingHeard)
        };

        self.resolve(Some(placeholder), result)
    }

    fn resolve(&mut self, placeholder: Option<EntryId>, result: SpeechResult) -> SpeechResult {
        if let Some(id) = placeholder {
            self.history.remove(id);
        }

        self.state = match &result {
            SpeechResult::Completed { transcript } => SessionState::Completed(transcript.clone()),
            SpeechResult::Failed { reason } => SessionState::Failed(reason.clone()),
        };

        tracing::debug!(state = ?self.state, "speech session resolved");
        result
    }
}
