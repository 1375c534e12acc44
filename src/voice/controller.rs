//! Voice mode controller
//!
//! Owns the voice mode flag and the wake word channel opened while it is set.
//! Wake events and manual microphone activations both funnel into
//! [`VoiceModeController::activate`], which enforces the single active
//! capture rule before starting a [`SpeechSession`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::engine::{CaptureSettings, SpeechEngine};
use super::session::{ErrorKind, SpeechResult, SpeechSession};
use super::wake_channel::{ChannelHandle, ChannelState, WakeCallback, WakeWordChannel};
use crate::Result;
use crate::chat::{ChatDispatcher, ChatHistory, ChatSender};

/// When the `speak` flag sent with a transcript is decided
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakFlagPolicy {
    /// Read the voice mode flag when the transcript is dispatched
    ///
    /// Disabling voice mode mid-capture therefore sends `speak=false`.
    #[default]
    AtDispatch,
    /// Snapshot the voice mode flag when the capture starts
    AtSessionStart,
}

/// What started a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// User pressed the microphone control
    Manual,
    /// Backend reported a wake word
    WakeWord,
}

/// Outcome of an activation request
#[derive(Debug)]
pub enum Activation {
    /// Capture running; the task resolves after the result was dispatched
    /// or reported
    Started(JoinHandle<SpeechResult>),
    /// Dropped because another capture is running
    AlreadyActive,
    /// No speech capture capability
    Unsupported,
}

impl Activation {
    /// Whether a capture was started
    #[must_use]
    pub const fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

#[derive(Default)]
struct VoiceMode {
    enabled: bool,
    handle: Option<ChannelHandle>,
}

struct Inner {
    channel: WakeWordChannel,
    engine: Option<Arc<dyn SpeechEngine>>,
    capture: CaptureSettings,
    dispatcher: ChatDispatcher,
    speak_policy: SpeakFlagPolicy,
    mode: Mutex<VoiceMode>,
    /// Serializes enable and disable so callers see the settled outcome
    transition: tokio::sync::Mutex<()>,
    capture_active: AtomicBool,
    unsupported_reported: AtomicBool,
}

impl Inner {
    fn mode(&self) -> MutexGuard<'_, VoiceMode> {
        self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the capture slot when dropped
struct CaptureGuard(Arc<Inner>);

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.0.capture_active.store(false, Ordering::Release);
    }
}

/// Voice mode state machine
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct VoiceModeController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for VoiceModeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceModeController")
            .field("enabled", &self.is_enabled())
            .field("capturing", &self.is_capturing())
            .field("speak_policy", &self.inner.speak_policy)
            .finish_non_exhaustive()
    }
}

/// Builder for [`VoiceModeController`]
pub struct VoiceModeControllerBuilder {
    channel: WakeWordChannel,
    dispatcher: ChatDispatcher,
    engine: Option<Arc<dyn SpeechEngine>>,
    capture: CaptureSettings,
    speak_policy: SpeakFlagPolicy,
}

impl VoiceModeControllerBuilder {
    /// Speech capture engine; without one every activation reports
    /// unsupported
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn SpeechEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Capture settings passed to the engine
    #[must_use]
    pub fn capture(mut self, capture: CaptureSettings) -> Self {
        self.capture = capture;
        self
    }

    /// When to decide the `speak` flag
    #[must_use]
    pub const fn speak_flag(mut self, policy: SpeakFlagPolicy) -> Self {
        self.speak_policy = policy;
        self
    }

    /// Build the controller, voice mode off
    #[must_use]
    pub fn build(self) -> VoiceModeController {
        VoiceModeController {
            inner: Arc::new(Inner {
                channel: self.channel,
                engine: self.engine,
                capture: self.capture,
                dispatcher: self.dispatcher,
                speak_policy: self.speak_policy,
                mode: Mutex::new(VoiceMode::default()),
                transition: tokio::sync::Mutex::new(()),
                capture_active: AtomicBool::new(false),
                unsupported_reported: AtomicBool::new(false),
            }),
        }
    }
}

impl VoiceModeController {
    /// Start building a controller
    #[must_use]
    pub fn builder(channel: WakeWordChannel, dispatcher: ChatDispatcher) -> VoiceModeControllerBuilder {
        VoiceModeControllerBuilder {
            channel,
            dispatcher,
            engine: None,
            capture: CaptureSettings::default(),
            speak_policy: SpeakFlagPolicy::default(),
        }
    }

    /// Whether voice mode is on
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.mode().enabled
    }

    /// Whether a capture is running
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.inner.capture_active.load(Ordering::Acquire)
    }

    /// Wake word stream state, `None` while voice mode is off
    #[must_use]
    pub fn channel_state(&self) -> Option<ChannelState> {
        self.inner.mode().handle.as_ref().map(ChannelHandle::state)
    }

    /// Whether the wake word stream is currently connected
    #[must_use]
    pub fn wake_word_active(&self) -> bool {
        self.channel_state() == Some(ChannelState::Connected)
    }

    /// Shared chat history
    #[must_use]
    pub fn history(&self) -> &ChatHistory {
        self.inner.dispatcher.history()
    }

    /// Chat dispatcher used for transcripts
    #[must_use]
    pub fn dispatcher(&self) -> &ChatDispatcher {
        &self.inner.dispatcher
    }

    /// Turn voice mode on or off
    ///
    /// Enabling starts wake word detection and opens a fresh channel;
    /// disabling closes it. Both are no-ops when the flag already matches.
    /// Calls are serialized: a call made while another is opening the channel
    /// waits for it and then acts on the settled flag. A capture in flight is
    /// never cancelled.
    ///
    /// # Errors
    ///
    /// Returns error if the backend refuses to start detection; voice mode
    /// stays off so a later enable retries from scratch
    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        let _transition = self.inner.transition.lock().await;
        if enabled {
            self.enable().await
        } else {
            self.disable().await;
            Ok(())
        }
    }

    /// Flip voice mode, returning the new value
    ///
    /// # Errors
    ///
    /// Returns error if enabling fails
    pub async fn toggle(&self) -> Result<bool> {
        let target = !self.is_enabled();
        self.set_enabled(target).await?;
        Ok(target)
    }

    async fn enable(&self) -> Result<()> {
        {
            let mut mode = self.inner.mode();
            if mode.enabled {
                return Ok(());
            }
            // Set before opening so early wake events are not dropped
            mode.enabled = true;
        }

        tracing::info!("enabling voice mode");

        let weak = Arc::downgrade(&self.inner);
        let on_wake: WakeCallback = Arc::new(move |_event| on_wake_event(&weak));

        match self.inner.channel.open(on_wake).await {
            Ok(handle) => {
                self.inner.mode().handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.inner.mode().enabled = false;
                tracing::warn!(error = %e, "voice mode could not be enabled");
                Err(e)
            }
        }
    }

    async fn disable(&self) {
        let handle = {
            let mut mode = self.inner.mode();
            if !mode.enabled {
                return;
            }
            mode.enabled = false;
            mode.handle.take()
        };

        tracing::info!("disabling voice mode");

        if let Some(handle) = handle {
            handle.close().await;
        }
    }

    /// Start a capture unless one is already running
    ///
    /// A completed transcript is dispatched to chat; a failure is reported in
    /// the history with the reason's user message. Must be called inside a
    /// Tokio runtime.
    #[must_use = "the activation reports whether a capture started"]
    pub fn activate(&self, trigger: Trigger) -> Activation {
        let Some(engine) = self.inner.engine.clone() else {
            if !self.inner.unsupported_reported.swap(true, Ordering::AcqRel) {
                self.history()
                    .push(ChatSender::Assistant, ErrorKind::Unsupported.user_message());
            }
            tracing::info!(?trigger, "speech capture unsupported");
            return Activation::Unsupported;
        };

        if self
            .inner
            .capture_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(?trigger, "capture already active; dropping trigger");
            return Activation::AlreadyActive;
        }

        let guard = CaptureGuard(Arc::clone(&self.inner));
        let snapshot = match self.inner.speak_policy {
            SpeakFlagPolicy::AtSessionStart => Some(self.is_enabled()),
            SpeakFlagPolicy::AtDispatch => None,
        };

        let mut session = SpeechSession::new(
            Some(engine),
            self.inner.capture.clone(),
            self.history().clone(),
        );

        tracing::info!(?trigger, "starting speech capture");

        let controller = self.clone();
        Activation::Started(tokio::spawn(async move {
            let result = session.start().await;
            drop(guard);

            match &result {
                SpeechResult::Completed { transcript } => {
                    let speak = snapshot.unwrap_or_else(|| controller.is_enabled());
                    tracing::debug!(speak, "dispatching transcript");
                    controller.inner.dispatcher.send(transcript, speak).await;
                }
                SpeechResult::Failed { reason } if reason.is_announced() => {
                    tracing::info!(%reason, "speech capture failed");
                    controller
                        .history()
                        .push(ChatSender::Assistant, reason.user_message());
                }
                SpeechResult::Failed { .. } => {
                    tracing::debug!("capture ended without speech");
                }
            }

            result
        }))
    }

    /// Send typed text, speaking the reply when voice mode is on
    pub async fn submit_text(&self, text: &str) {
        let speak = self.is_enabled();
        self.inner.dispatcher.send(text, speak).await;
    }

    /// Queue for typed text that is submitted in the background
    ///
    /// Lines are sent one at a time in queue order, so the caller can keep
    /// reading input (for example the utterance of a capture) while a chat
    /// call is in flight. The worker stops once every sender is dropped.
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn text_input(&self) -> mpsc::UnboundedSender<String> {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                controller.submit_text(&text).await;
            }
            tracing::debug!("text input closed");
        });
        tx
    }
}

fn on_wake_event(inner: &Weak<Inner>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let controller = VoiceModeController { inner };
    if !controller.is_enabled() {
        tracing::debug!("wake event while voice mode is off; ignoring");
        return;
    }
    if let Activation::Started(_) = controller.activate(Trigger::WakeWord) {
        tracing::debug!("wake word started capture");
    }
}
