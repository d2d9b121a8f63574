/// Database row types: these map directly to SQLite rows.
/// Distinct from murmur-types models to keep the DB layer independent.
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use murmur_types::{Chat, Message};
use uuid::Uuid;

pub struct ChatRow {
    pub id: String,
    pub is_group: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: String,
}

/// Fixed-width UTC timestamps, so text order matches time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt timestamp '{}'", raw))?;
    Ok(ts.with_timezone(&Utc))
}

pub fn parse_id(raw: &str, column: &str) -> Result<Uuid> {
    raw.parse()
        .with_context(|| format!("corrupt {} '{}'", column, raw))
}

impl ChatRow {
    pub fn into_chat(self, participants: Vec<String>) -> Result<Chat> {
        let participant_ids = participants
            .iter()
            .map(|p| parse_id(p, "user_id"))
            .collect::<Result<Vec<_>>>()?;

        Ok(Chat {
            id: parse_id(&self.id, "chat id")?,
            participant_ids,
            is_group: self.is_group,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: parse_id(&row.id, "message id")?,
            chat_id: parse_id(&row.chat_id, "chat_id")?,
            sender_id: parse_id(&row.sender_id, "sender_id")?,
            body: row.body,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
