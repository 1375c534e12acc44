//! Streaming transport for wake word notifications

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Error, Result};

/// One live notification stream
#[async_trait]
pub trait WakeConnection: Send {
    /// Next text payload
    ///
    /// Returns `None` once the remote side has closed the stream; a transport
    /// error is reported once and the stream should be considered dead.
    async fn next_message(&mut self) -> Option<Result<String>>;

    /// Close the stream
    async fn close(&mut self);
}

/// Opens notification streams
#[async_trait]
pub trait WakeTransport: Send + Sync {
    /// Open a new stream
    async fn connect(&self) -> Result<Box<dyn WakeConnection>>;
}

/// WebSocket transport for the backend's wake word endpoint
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    /// Create a transport for `url` (e.g. `ws://localhost:8000/ws/wake-word`)
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Endpoint URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WakeTransport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn WakeConnection>> {
        tracing::debug!(url = %self.url, "connecting wake word stream");

        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Transport(format!("connect {}: {e}", self.url)))?;

        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl WakeConnection for WsConnection {
    async fn next_message(&mut self) -> Option<Result<String>> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => {
                        tracing::debug!(len = bytes.len(), "skipping non-utf8 binary frame");
                    }
                },
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "wake word stream closed by remote");
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(Error::Transport(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "wake word stream close handshake failed");
        }
    }
}
