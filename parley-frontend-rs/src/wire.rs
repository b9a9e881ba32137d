//! Event names and payload shapes that make up the contract with the chat server.

use parley::data_model::{ChatId, ServerEvent, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WireError;

pub const CHAT_MESSAGE: &str = "chat message";
pub const CREATE_CHAT: &str = "create chat";
pub const ERROR: &str = "error";

/// Client to server actions.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Action {
    SendMessage {
        #[serde(rename = "chatId")]
        chat_id: ChatId,
        message: String,
    },
    CreateChat {
        name: String,
        members: Vec<UserId>,
    },
}

impl Action {
    pub fn event_name(&self) -> &'static str {
        match self {
            Action::SendMessage { .. } => CHAT_MESSAGE,
            Action::CreateChat { .. } => CREATE_CHAT,
        }
    }

    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: String,
}

/// Translates a named server event into a [`ServerEvent`].
///
/// Returns `Ok(None)` for events this client doesn't care about.
pub fn decode_event(name: &str, args: &[Value]) -> Result<Option<ServerEvent>, WireError> {
    let bad_arguments = |reason: String| WireError::Arguments {
        name: name.to_string(),
        reason,
    };

    let event = match (name, args) {
        (CHAT_MESSAGE, [chat_id, message, ..]) => ServerEvent::ChatMessage {
            chat_id: serde_json::from_value(chat_id.clone())
                .map_err(|e| bad_arguments(format!("chat id: {e}")))?,
            message: serde_json::from_value(message.clone())
                .map_err(|e| bad_arguments(format!("message: {e}")))?,
        },
        (CREATE_CHAT, [chat, ..]) => ServerEvent::CreateChat(
            serde_json::from_value(chat.clone()).map_err(|e| bad_arguments(format!("chat: {e}")))?,
        ),
        (ERROR, [Value::String(message), ..]) => ServerEvent::Error {
            message: message.clone(),
        },
        (ERROR, [payload, ..]) => {
            let payload: ErrorPayload = serde_json::from_value(payload.clone())
                .map_err(|e| bad_arguments(format!("error: {e}")))?;
            ServerEvent::Error {
                message: payload.message,
            }
        }
        (CHAT_MESSAGE | CREATE_CHAT | ERROR, _) => {
            return Err(bad_arguments(format!("got {} arguments", args.len())));
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}
