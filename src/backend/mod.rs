//! Assistant backend collaborators
//!
//! The voice shell consumes a small slice of the backend's HTTP surface:
//! chat dispatch and wake word detection control. Both are expressed as
//! traits so sessions and channels can run against in-memory fakes.

mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::BackendClient;

use crate::Result;

/// Request body for `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User message text
    pub message: String,
    /// Whether the backend should speak the response aloud
    pub speak_response: bool,
}

/// Response body of `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Assistant reply text
    pub response: String,
}

/// Response body of `GET /api/wake-word/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeWordStatus {
    /// Whether the detector loop is running
    pub active: bool,
    /// Keyword the detector listens for
    #[serde(default)]
    pub keyword: Option<String>,
}

/// Chat endpoint of the assistant backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a chat message and return the assistant reply
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// Wake word detection control endpoints of the assistant backend
#[async_trait]
pub trait WakeWordBackend: Send + Sync {
    /// Ask the backend to start its wake word detector
    async fn start_detection(&self) -> Result<()>;

    /// Ask the backend to stop its wake word detector
    async fn stop_detection(&self) -> Result<()>;
}
