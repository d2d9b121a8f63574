use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::models::Message;

/// Events sent FROM server TO client over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A message was persisted in a chat this session has joined
    ReceiveMessage(Message),

    /// A command from this session failed. Never sent to other sessions.
    Error { kind: ErrorKind, message: String },
}

impl GatewayEvent {
    /// Returns the chat_id if this event belongs to a specific chat.
    pub fn chat_id(&self) -> Option<Uuid> {
        match self {
            Self::ReceiveMessage(message) => Some(message.chat_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving messages for a chat
    JoinChat { chat_id: Uuid },

    /// Stop receiving messages for a chat
    LeaveChat { chat_id: Uuid },

    /// Persist a message and deliver it to everyone in the chat.
    /// `sender_id` is optional; when present it must match the session's user.
    SendMessage {
        chat_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<Uuid>,
        body: String,
    },
}
