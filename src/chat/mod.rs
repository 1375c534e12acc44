//! Chat history and dispatch
//!
//! The history is the only state shared between the voice components. It is
//! append-only apart from the targeted removal of a session's own placeholder.

mod dispatch;
mod history;

pub use dispatch::ChatDispatcher;
pub use history::{ChatExchange, ChatHistory, ChatSender, EntryId, HistoryEvent};
