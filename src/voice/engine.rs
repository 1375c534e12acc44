//! Speech capture engine abstraction
//!
//! An engine performs one capture per `start` call and reports progress as a
//! stream of [`EngineEvent`]s: zero or more result batches, optionally an
//! error, then the end of the capture.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::{Error, Result};

/// Settings passed to the engine on every capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// BCP 47 language tag
    pub language: String,
    /// Report non-final segments while the user speaks
    pub interim_results: bool,
    /// Maximum recognition alternatives per segment
    pub max_alternatives: u32,
    /// Keep capturing after the first utterance
    pub continuous: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            interim_results: true,
            max_alternatives: 1,
            continuous: false,
        }
    }
}

/// A recognized piece of speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Recognized text
    pub text: String,
    /// Whether the engine will not revise this segment any more
    pub is_final: bool,
}

impl Segment {
    /// A final segment
    #[must_use]
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    /// An interim (revisable) segment
    #[must_use]
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }
}

/// Progress notification from a running capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// New or revised segments
    Results(Vec<Segment>),
    /// Capture failed with an engine error code (e.g. "no-speech", "not-allowed")
    Error(String),
    /// Capture ended
    End,
}

/// Platform speech capture capability
pub trait SpeechEngine: Send + Sync {
    /// Begin one capture
    ///
    /// # Errors
    ///
    /// Returns error if the engine refuses to start
    fn start(&self, settings: &CaptureSettings) -> Result<mpsc::UnboundedReceiver<EngineEvent>>;
}

/// Engine that treats the next line typed on the terminal as speech
///
/// While a capture is pending, [`ConsoleEngine::feed_line`] turns a line into
/// a final segment. A blank line ends the capture without speech and
/// `/cancel` aborts it.
#[derive(Debug, Default)]
pub struct ConsoleEngine {
    pending: Mutex<Option<mpsc::UnboundedSender<EngineEvent>>>,
}

impl ConsoleEngine {
    /// Create an idle console engine
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a capture is waiting for input
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Route a typed line into the pending capture
    ///
    /// Returns false if no capture was waiting, in which case the caller
    /// should handle the line itself.
    pub fn feed_line(&self, line: &str) -> bool {
        let Some(tx) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return false;
        };

        if tx.is_closed() {
            return false;
        }

        let line = line.trim();
        if line == "/cancel" {
            let _ = tx.send(EngineEvent::Error("aborted".to_string()));
        } else if !line.is_empty() {
            let _ = tx.send(EngineEvent::Results(vec![Segment::final_text(line)]));
        }
        let _ = tx.send(EngineEvent::End);
        true
    }
}

impl SpeechEngine for ConsoleEngine {
    fn start(&self, settings: &CaptureSettings) -> Result<mpsc::UnboundedReceiver<EngineEvent>> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(Error::Speech("console capture already running".to_string()));
        }

        tracing::debug!(language = %settings.language, "console capture started");
        let (tx, rx) = mpsc::unbounded_channel();
        *pending = Some(tx);
        Ok(rx)
    }
}
