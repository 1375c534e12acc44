//! HTTP client for the assistant backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};

use super::{ChatBackend, ChatRequest, ChatResponse, WakeWordBackend, WakeWordStatus};
use crate::config::BackendConfig;
use crate::{Error, Result};

/// Client for the assistant backend's HTTP API
#[derive(Debug, Clone)]
pub struct BackendClient {
    /// HTTP client
    client: Client,
    /// Base URL without trailing slash (e.g. `http://localhost:8000`)
    base_url: String,
}

impl BackendClient {
    /// Create a new backend client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the backend (e.g., <http://localhost:8000>)
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    /// Create a client from the backend section of the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(config.api_url.clone(), config.timeout)
    }

    /// Base URL this client talks to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Probe `GET /api/status`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or answers non-2xx
    pub async fn status(&self) -> Result<serde_json::Value> {
        let response = self.client.get(self.endpoint("/api/status")).send().await?;
        let body = check(response).await?.json().await?;
        Ok(body)
    }

    /// Query `GET /api/wake-word/status`
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is invalid
    pub async fn wake_word_status(&self) -> Result<WakeWordStatus> {
        let response = self
            .client
            .get(self.endpoint("/api/wake-word/status"))
            .send()
            .await?;
        let status = check(response).await?.json().await?;
        Ok(status)
    }

    async fn post_empty(&self, path: &str) -> Result<()> {
        let response = self.client.post(self.endpoint(path)).send().await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for BackendClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        tracing::debug!(
            chars = request.message.len(),
            speak = request.speak_response,
            "sending chat message"
        );

        let response = self
            .client
            .post(self.endpoint("/api/chat"))
            .json(request)
            .send()
            .await?;
        let reply = check(response).await?.json().await?;
        Ok(reply)
    }
}

#[async_trait]
impl WakeWordBackend for BackendClient {
    async fn start_detection(&self) -> Result<()> {
        self.post_empty("/api/wake-word/start").await
    }

    async fn stop_detection(&self) -> Result<()> {
        self.post_empty("/api/wake-word/stop").await
    }
}

/// Turn a non-2xx response into `Error::Api`
async fn check(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api { status, body })
}
