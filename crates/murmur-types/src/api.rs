use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Chat;

// -- JWT Claims --

/// Claims carried by the tokens the account service issues. The gateway and
/// the REST middleware both verify against this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Chats --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChatRequest {
    pub other_user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupChatRequest {
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub chat: Chat,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub body: String,
}

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 200;

/// Window of history to return. Without `before` this is the newest
/// `limit` messages; with it, the `limit` messages preceding that message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Uuid>,
}

fn default_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
            before: None,
        }
    }
}

impl HistoryQuery {
    pub fn latest(limit: u32) -> Self {
        Self {
            limit,
            before: None,
        }
    }

    /// Clamp `limit` into `1..=max`.
    pub fn clamped(self, max: u32) -> Self {
        Self {
            limit: self.limit.clamp(1, max.max(1)),
            before: self.before,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
