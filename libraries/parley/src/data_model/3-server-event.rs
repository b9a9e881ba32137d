//! # ServerEvent
//! Events pushed by the server that affect (or could affect) the snapshot.
//! Connection lifecycle (connect, disconnect, ...) is not modelled here; that's the transport's business.

use crate::data_model::{Chat, ChatId, Message};

#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// A message was posted to an existing chat.
    ChatMessage { chat_id: ChatId, message: Message },
    /// A chat was created. Applying the same creation twice is harmless.
    CreateChat(Chat),
    /// The server rejected something we did. Carries the server's description.
    Error { message: String },
}
