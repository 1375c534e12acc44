//! Voice interaction session management
//!
//! Handles the wake word notification channel, speech capture sessions and
//! the voice mode controller that wires them to chat dispatch.
//! Audio capture and recognition live behind the [`SpeechEngine`] trait.

mod controller;
mod engine;
mod retry;
mod session;
mod transport;
mod wake_channel;

pub use controller::{
    Activation, SpeakFlagPolicy, Trigger, VoiceModeController, VoiceModeControllerBuilder,
};
pub use engine::{CaptureSettings, ConsoleEngine, EngineEvent, Segment, SpeechEngine};
pub use retry::ReconnectPolicy;
pub use session::{
    ErrorCategory, ErrorKind, LISTENING_PLACEHOLDER, SessionState, SpeechResult, SpeechSession,
};
pub use transport::{WakeConnection, WakeTransport, WsTransport};
pub use wake_channel::{
    ChannelHandle, ChannelState, WakeCallback, WakeEvent, WakeWordChannel, parse_wake_message,
};
