use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A conversation between a fixed set of users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    /// In creation order. Direct chats always hold exactly two users.
    pub participant_ids: Vec<Uuid>,
    pub is_group: bool,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participant_ids.contains(&user_id)
    }
}

/// A persisted chat message. The id and timestamp are assigned by the store,
/// so a `Message` only exists once it is durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Render order: timestamp first, then the textual id so that
    /// messages sharing a timestamp still sort the same way everywhere.
    pub fn timeline_key(&self) -> (DateTime<Utc>, String) {
        (self.created_at, self.id.to_string())
    }
}
