//! Chat dispatch
//!
//! Submits finalized text to the backend and records the exchange.

use std::sync::Arc;

use super::{ChatHistory, ChatSender};
use crate::backend::{ChatBackend, ChatRequest};

/// Sends user text to the chat backend and appends both sides to the history
#[derive(Clone)]
pub struct ChatDispatcher {
    backend: Arc<dyn ChatBackend>,
    history: ChatHistory,
    error_message: String,
}

impl std::fmt::Debug for ChatDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatDispatcher")
            .field("history_len", &self.history.len())
            .field("error_message", &self.error_message)
            .finish_non_exhaustive()
    }
}

impl ChatDispatcher {
    /// Create a dispatcher
    ///
    /// `error_message` is appended as the assistant reply whenever the chat
    /// call fails.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        history: ChatHistory,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            history,
            error_message: error_message.into(),
        }
    }

    /// History this dispatcher appends to
    #[must_use]
    pub const fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Send `text` to the backend
    ///
    /// Blank input is ignored. The user entry is appended before the call;
    /// exactly one assistant entry (reply or error message) follows it.
    /// Never fails: backend errors are logged and recorded in the history.
    pub async fn send(&self, text: &str, speak: bool) {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("ignoring blank chat message");
            return;
        }

        self.history.push(ChatSender::User, text);

        let request = ChatRequest {
            message: text.to_string(),
            speak_response: speak,
        };

        match self.backend.chat(&request).await {
            Ok(reply) => {
                self.history.push(ChatSender::Assistant, reply.response);
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat dispatch failed");
                self.history
                    .push(ChatSender::Assistant, self.error_message.clone());
            }
        }
    }
}
