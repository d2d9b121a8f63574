use chrono::Utc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use murmur_types::api::HistoryQuery;
use murmur_types::{Chat, ChatError, Message};

use crate::Database;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chat {0} not found")]
    ChatNotFound(Uuid),

    #[error("invalid chat: {0}")]
    InvalidChat(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ChatNotFound(id) => ChatError::ChatNotFound(id),
            StoreError::InvalidChat(reason) => ChatError::Validation(reason),
            StoreError::Backend(e) => ChatError::Persistence(e.to_string()),
        }
    }
}

/// Durable record of chats and messages.
///
/// Calls are blocking; async callers run them on `spawn_blocking`. Every
/// implementation must give read-your-writes: once `create_message` returns,
/// `list_messages` on the same store includes the message.
pub trait MessageStore: Send + Sync + 'static {
    /// Appends a message, assigning its id and timestamp.
    fn create_message(&self, chat_id: Uuid, sender_id: Uuid, body: &str) -> Result<Message, StoreError>;

    /// Messages of a chat in ascending creation order, windowed by `query`.
    fn list_messages(&self, chat_id: Uuid, query: HistoryQuery) -> Result<Vec<Message>, StoreError>;

    /// Same chat for the same unordered pair, however often it is called.
    fn find_or_create_direct_chat(&self, user_a: Uuid, user_b: Uuid) -> Result<Chat, StoreError>;

    /// New group chat of `creator` plus `members`.
    fn create_group_chat(&self, creator: Uuid, members: &[Uuid]) -> Result<Chat, StoreError>;

    fn get_chat(&self, chat_id: Uuid) -> Result<Option<Chat>, StoreError>;

    fn list_chats(&self, user_id: Uuid) -> Result<Vec<Chat>, StoreError>;
}

impl MessageStore for Database {
    fn create_message(&self, chat_id: Uuid, sender_id: Uuid, body: &str) -> Result<Message, StoreError> {
        let id = Uuid::new_v4();
        let row = self
            .insert_message(
                &id.to_string(),
                &chat_id.to_string(),
                &sender_id.to_string(),
                body,
                Utc::now(),
            )?
            .ok_or(StoreError::ChatNotFound(chat_id))?;

        debug!("Stored message {} in chat {}", id, chat_id);
        Ok(Message::try_from(row)?)
    }

    fn list_messages(&self, chat_id: Uuid, query: HistoryQuery) -> Result<Vec<Message>, StoreError> {
        let before = query.before.map(|id| id.to_string());
        let rows = self
            .get_messages(&chat_id.to_string(), query.limit, before.as_deref())?
            .ok_or(StoreError::ChatNotFound(chat_id))?;

        rows.into_iter()
            .map(|row| Message::try_from(row).map_err(StoreError::from))
            .collect()
    }

    fn find_or_create_direct_chat(&self, user_a: Uuid, user_b: Uuid) -> Result<Chat, StoreError> {
        if user_a == user_b {
            return Err(StoreError::InvalidChat(
                "a direct chat needs two different users".into(),
            ));
        }

        let chat = self.upsert_direct_chat(
            &Uuid::new_v4().to_string(),
            &user_a.to_string(),
            &user_b.to_string(),
            Utc::now(),
        )?;
        Ok(chat)
    }

    fn create_group_chat(&self, creator: Uuid, members: &[Uuid]) -> Result<Chat, StoreError> {
        let mut participants = vec![creator];
        for member in members {
            if !participants.contains(member) {
                participants.push(*member);
            }
        }
        if participants.len() < 2 {
            return Err(StoreError::InvalidChat(
                "a group chat needs at least one other member".into(),
            ));
        }

        let ids: Vec<String> = participants.iter().map(Uuid::to_string).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let chat = self.insert_group_chat(&Uuid::new_v4().to_string(), &refs, Utc::now())?;
        Ok(chat)
    }

    fn get_chat(&self, chat_id: Uuid) -> Result<Option<Chat>, StoreError> {
        Ok(self.get_chat_by_id(&chat_id.to_string())?)
    }

    fn list_chats(&self, user_id: Uuid) -> Result<Vec<Chat>, StoreError> {
        Ok(self.list_chats_for_user(&user_id.to_string())?)
    }
}
