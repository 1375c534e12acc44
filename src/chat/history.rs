//! In-memory ordered chat history

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the history notification channel
const EVENT_CAPACITY: usize = 256;

/// Who authored a chat entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatSender {
    /// The human user
    User,
    /// The assistant (replies, status lines, error messages)
    Assistant,
}

impl fmt::Display for ChatSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Identity of a history entry, unique within one history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(u64);

/// One immutable chat entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatExchange {
    /// Entry identity
    pub id: EntryId,
    /// Author
    pub sender: ChatSender,
    /// Message text
    pub text: String,
    /// When the entry was appended
    pub at: DateTime<Utc>,
}

/// Change notification published by [`ChatHistory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    /// An entry was appended at the end
    Appended(ChatExchange),
    /// An entry was removed
    Removed(EntryId),
}

#[derive(Debug, Default)]
struct HistoryInner {
    entries: Vec<ChatExchange>,
    next_id: u64,
}

/// Shared, ordered chat history
///
/// Cloning yields another handle to the same history. Appends are strictly
/// in call order; entries are never edited after creation.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    inner: Arc<Mutex<HistoryInner>>,
    events: broadcast::Sender<HistoryEvent>,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatHistory {
    /// Create an empty history
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(HistoryInner::default())),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HistoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry and return its id
    pub fn push(&self, sender: ChatSender, text: impl Into<String>) -> EntryId {
        let exchange = {
            let mut inner = self.lock();
            let id = EntryId(inner.next_id);
            inner.next_id += 1;

            let exchange = ChatExchange {
                id,
                sender,
                text: text.into(),
                at: Utc::now(),
            };
            inner.entries.push(exchange.clone());
            exchange
        };

        tracing::trace!(id = ?exchange.id, sender = %exchange.sender, "history append");
        let id = exchange.id;
        let _ = self.events.send(HistoryEvent::Appended(exchange));
        id
    }

    /// Remove exactly the entry with `id`
    ///
    /// Returns false if no such entry exists (already removed).
    pub fn remove(&self, id: EntryId) -> bool {
        let removed = {
            let mut inner = self.lock();
            inner
                .entries
                .iter()
                .position(|e| e.id == id)
                .map(|pos| inner.entries.remove(pos))
                .is_some()
        };

        if removed {
            let _ = self.events.send(HistoryEvent::Removed(id));
        }
        removed
    }

    /// Copy of all entries in order
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatExchange> {
        self.lock().entries.clone()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Most recent entry
    #[must_use]
    pub fn last(&self) -> Option<ChatExchange> {
        self.lock().entries.last().cloned()
    }

    /// Subscribe to append/remove notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.events.subscribe()
    }
}
