use parley::data_model::{ChatId, UserId};

use crate::connection::ConnectionHandle;
use crate::wire::Action;

/// What happened to a dispatched action. None of these are errors: the server's echo is the only
/// confirmation an action ever gets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    /// The action was invalid (empty message, unnamed chat, ...) so nothing was sent.
    Skipped,
    /// We're not connected right now. The action is dropped, not queued.
    NotConnected,
}

/// Sends user actions to the server. Never touches local state; results show up when the server
/// echoes them back as events.
#[derive(Clone, Debug)]
pub struct OutboundDispatcher {
    connection: ConnectionHandle,
}

impl OutboundDispatcher {
    pub fn new(connection: ConnectionHandle) -> Self {
        Self { connection }
    }

    pub fn send_message(&self, chat_id: &ChatId, message: Option<&str>) -> Dispatch {
        let Some(message) = message.filter(|message| !message.is_empty()) else {
            log::debug!("Not sending empty message to {chat_id}");
            return Dispatch::Skipped;
        };
        self.dispatch(Action::SendMessage {
            chat_id: chat_id.clone(),
            message: message.to_string(),
        })
    }

    pub fn create_chat(&self, name: &str, members: &[UserId]) -> Dispatch {
        if name.is_empty() || members.len() < 2 {
            log::debug!(
                "Not creating chat {name:?} with {} member(s)",
                members.len()
            );
            return Dispatch::Skipped;
        }
        self.dispatch(Action::CreateChat {
            name: name.to_string(),
            members: members.to_vec(),
        })
    }

    fn dispatch(&self, action: Action) -> Dispatch {
        if self.connection.emit(action.event_name(), action.payload()) {
            Dispatch::Sent
        } else {
            log::debug!("Dropping {:?}, not connected", action.event_name());
            Dispatch::NotConnected
        }
    }
}
