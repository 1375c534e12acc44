//! Wake word notification channel
//!
//! Owns one streaming connection to the backend's wake word service while
//! voice mode is on. Opening first asks the backend to start detection; the
//! stream is then kept alive with a reconnect loop until the handle is closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::retry::ReconnectPolicy;
use super::transport::{WakeConnection, WakeTransport};
use crate::backend::WakeWordBackend;
use crate::{Error, Result};

/// Event name the backend uses for wake notifications
const WAKE_WORD_EVENT: &str = "wake_word";

/// Connection state of the notification stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No live stream (initial, between attempts, or closed)
    Disconnected,
    /// Opening the stream
    Connecting,
    /// Stream open, notifications flowing
    Connected,
}

/// A detected wake word
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WakeEvent {
    /// Keyword reported by the detector, if any
    pub keyword: Option<String>,
}

/// Handler invoked once per wake event
///
/// Runs on the channel task and must not block or close the channel.
pub type WakeCallback = Arc<dyn Fn(WakeEvent) + Send + Sync>;

#[derive(Debug, Deserialize)]
struct StreamMessage {
    event: String,
    #[serde(default)]
    keyword: Option<String>,
}

/// Parse a stream payload
///
/// Returns `Ok(None)` for well-formed messages that are not wake notifications.
///
/// # Errors
///
/// Returns error if the payload is not a `{ "event": ... }` JSON object
pub fn parse_wake_message(payload: &str) -> Result<Option<WakeEvent>> {
    let message: StreamMessage = serde_json::from_str(payload)?;
    if message.event == WAKE_WORD_EVENT {
        Ok(Some(WakeEvent {
            keyword: message.keyword,
        }))
    } else {
        Ok(None)
    }
}

/// Factory for wake word channels
#[derive(Clone)]
pub struct WakeWordChannel {
    backend: Arc<dyn WakeWordBackend>,
    transport: Arc<dyn WakeTransport>,
    policy: ReconnectPolicy,
}

impl std::fmt::Debug for WakeWordChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeWordChannel")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl WakeWordChannel {
    /// Create a channel factory
    #[must_use]
    pub fn new(
        backend: Arc<dyn WakeWordBackend>,
        transport: Arc<dyn WakeTransport>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            backend,
            transport,
            policy,
        }
    }

    /// Start detection on the backend and open the notification stream
    ///
    /// `on_wake` is invoked once per wake notification until the returned
    /// handle is closed.
    ///
    /// # Errors
    ///
    /// Returns error if the start detection request fails; no connection is
    /// attempted in that case
    pub async fn open(&self, on_wake: WakeCallback) -> Result<ChannelHandle> {
        self.backend.start_detection().await.map_err(|e| {
            tracing::warn!(error = %e, "failed to start wake word detection");
            Error::WakeWord(format!("start detection failed: {e}"))
        })?;

        tracing::info!("wake word detection started");

        let gate = Arc::new(Mutex::new(false));
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_channel(
            Arc::clone(&self.transport),
            self.policy.clone(),
            on_wake,
            Arc::clone(&gate),
            state_tx,
            shutdown_rx,
        ));

        Ok(ChannelHandle {
            backend: Arc::clone(&self.backend),
            gate,
            closing: AtomicBool::new(false),
            shutdown: shutdown_tx,
            task: Mutex::new(Some(task)),
            state: state_rx,
        })
    }
}

/// Handle to an open wake word channel
///
/// Closing (or dropping) the handle stops the reconnect loop.
pub struct ChannelHandle {
    backend: Arc<dyn WakeWordBackend>,
    /// Set once closed; held while a wake callback runs
    gate: Arc<Mutex<bool>>,
    closing: AtomicBool,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    state: watch::Receiver<ChannelState>,
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ChannelHandle {
    /// Current stream state
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Watch stream state changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Whether `close` has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Close the channel
    ///
    /// Cancels any pending reconnect, closes the live stream and asks the
    /// backend to stop detection. Idempotent and infallible: a failed stop
    /// request is logged, not retried. Once this returns the wake callback
    /// never runs again.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }

        *lock_gate(&self.gate) = true;
        self.shutdown.send_replace(true);

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "wake word channel task ended abnormally");
            }
        }

        if let Err(e) = self.backend.stop_detection().await {
            tracing::warn!(error = %e, "failed to stop wake word detection");
        }

        tracing::info!("wake word channel closed");
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }

        // A wake callback may be running on this thread
        match self.gate.try_lock() {
            Ok(mut closed) => *closed = true,
            Err(TryLockError::Poisoned(poisoned)) => *poisoned.into_inner() = true,
            Err(TryLockError::WouldBlock) => {}
        }
        self.shutdown.send_replace(true);

        // Best effort: the stop request needs a runtime
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let backend = Arc::clone(&self.backend);
            runtime.spawn(async move {
                if let Err(e) = backend.stop_detection().await {
                    tracing::warn!(error = %e, "failed to stop wake word detection");
                }
            });
        }
    }
}

fn lock_gate(gate: &Mutex<bool>) -> MutexGuard<'_, bool> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reconnect loop: connect, pump messages, wait, repeat until shutdown
async fn run_channel(
    transport: Arc<dyn WakeTransport>,
    policy: ReconnectPolicy,
    on_wake: WakeCallback,
    gate: Arc<Mutex<bool>>,
    state: watch::Sender<ChannelState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut failures: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        state.send_replace(ChannelState::Connecting);

        let connected = tokio::select! {
            result = transport.connect() => result,
            _ = shutdown.changed() => break,
        };

        match connected {
            Ok(mut conn) => {
                state.send_replace(ChannelState::Connected);
                failures = 0;
                tracing::info!("wake word stream connected");

                if pump(&mut *conn, &on_wake, &gate, &mut shutdown).await {
                    conn.close().await;
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "wake word stream connect failed");
            }
        }

        state.send_replace(ChannelState::Disconnected);

        let Some(delay) = policy.delay_for_attempt(failures) else {
            tracing::warn!(attempts = failures, "giving up on wake word stream");
            break;
        };
        failures = failures.saturating_add(1);

        tracing::debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt = failures,
            "scheduling wake word reconnect"
        );

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    state.send_replace(ChannelState::Disconnected);
    tracing::debug!("wake word channel loop stopped");
}

/// Forward messages until the stream ends; returns true on shutdown
async fn pump(
    conn: &mut dyn WakeConnection,
    on_wake: &WakeCallback,
    gate: &Mutex<bool>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        let message = tokio::select! {
            message = conn.next_message() => message,
            _ = shutdown.changed() => return true,
        };

        match message {
            Some(Ok(payload)) => deliver(&payload, on_wake, gate),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "wake word stream error");
                return false;
            }
            None => {
                tracing::info!("wake word stream disconnected");
                return false;
            }
        }
    }
}

fn deliver(payload: &str, on_wake: &WakeCallback, gate: &Mutex<bool>) {
    match parse_wake_message(payload) {
        Ok(Some(event)) => {
            let closed = lock_gate(gate);
            if *closed {
                tracing::debug!("dropping wake event received after close");
                return;
            }
            tracing::info!(keyword = ?event.keyword, "wake word detected");
            on_wake(event);
        }
        Ok(None) => tracing::trace!("ignoring non-wake stream message"),
        Err(e) => tracing::warn!(error = %e, "unparseable wake word message"),
    }
}
