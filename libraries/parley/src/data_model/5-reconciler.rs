//! # Reconciler
//! Applying a single server event to a snapshot. Each event maps to exactly one transition,
//! and a rejected event leaves the snapshot untouched.

use crate::AppState;
use crate::data_model::{ChatId, ServerEvent, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconciliationError {
    /// The server sent a message for a chat that isn't in the snapshot. This happens if a
    /// chat creation and its first message are delivered out of order.
    #[error("received a message for unknown chat {0}")]
    UnknownChat(ChatId),
}

impl AppState for Snapshot {
    type Event = ServerEvent;
    type Error = ReconciliationError;

    fn apply_event(&self, event: &ServerEvent) -> Result<Self, ReconciliationError> {
        match event {
            ServerEvent::ChatMessage { chat_id, message } => {
                let Some(chat) = self.chat(chat_id) else {
                    return Err(ReconciliationError::UnknownChat(chat_id.clone()));
                };
                Ok(self.with_chat(chat.with_message(message.clone())))
            }
            ServerEvent::CreateChat(chat) => Ok(self.with_chat(chat.clone())),
            // Nothing to change; the caller surfaces the error.
            ServerEvent::Error { .. } => Ok(self.clone()),
        }
    }
}
