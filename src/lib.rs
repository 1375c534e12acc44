//! Voice Shell - terminal control surface for a voice assistant
//!
//! This library provides the client-side voice interaction session manager:
//! - A reconnecting streaming channel to the backend's wake word detector
//! - Speech capture sessions with a single-active-session guard
//! - Chat dispatch with text-to-speech side-effect flags
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  VoiceModeController                 │
//! │   voice mode flag  │  capture guard  │  speak policy │
//! └───────┬──────────────────┬──────────────────┬───────┘
//!         │ wake events      │ activation       │ transcript
//! ┌───────▼────────┐ ┌───────▼────────┐ ┌───────▼────────┐
//! │ WakeWordChannel│ │ SpeechSession  │ │ ChatDispatcher │
//! │ ws + reconnect │ │ engine events  │ │ history append │
//! └───────┬────────┘ └────────────────┘ └───────┬────────┘
//!         │                                     │
//! ┌───────▼─────────────────────────────────────▼───────┐
//! │          Assistant backend (HTTP + WebSocket)        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod voice;

pub use backend::{BackendClient, ChatBackend, ChatRequest, ChatResponse, WakeWordBackend};
pub use chat::{ChatDispatcher, ChatExchange, ChatHistory, ChatSender, EntryId, HistoryEvent};
pub use config::Config;
pub use error::{Error, Result};
pub use voice::{
    Activation, CaptureSettings, ChannelHandle, ChannelState, ConsoleEngine, EngineEvent,
    ErrorCategory, ErrorKind, LISTENING_PLACEHOLDER, ReconnectPolicy, Segment, SessionState,
    SpeakFlagPolicy, SpeechEngine, SpeechResult, SpeechSession, Trigger, VoiceModeController,
    VoiceModeControllerBuilder, WakeCallback, WakeConnection, WakeEvent, WakeTransport,
    WakeWordChannel, WsTransport, parse_wake_message,
};
