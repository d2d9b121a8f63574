use crate::Database;
use crate::models::{ChatRow, MessageRow, format_timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use murmur_types::Chat;
use rusqlite::Connection;

impl Database {
    // -- Chats --

    pub fn get_chat_by_id(&self, chat_id: &str) -> Result<Option<Chat>> {
        self.with_conn(|conn| query_chat(conn, chat_id))
    }

    /// Returns the direct chat for the unordered pair (a, b), creating it
    /// with `new_id` if none exists yet.
    pub fn upsert_direct_chat(
        &self,
        new_id: &str,
        user_a: &str,
        user_b: &str,
        now: DateTime<Utc>,
    ) -> Result<Chat> {
        let direct_key = if user_a <= user_b {
            format!("{}:{}", user_a, user_b)
        } else {
            format!("{}:{}", user_b, user_a)
        };

        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM chats WHERE direct_key = ?1",
                    [&direct_key],
                    |row| row.get(0),
                )
                .optional()?;

            let chat_id = match existing {
                Some(id) => id,
                None => {
                    tx.execute(
                        "INSERT INTO chats (id, direct_key, is_group, created_at) VALUES (?1, ?2, 0, ?3)",
                        rusqlite::params![new_id, direct_key, format_timestamp(now)],
                    )?;
                    insert_participants(&tx, new_id, &[user_a, user_b])?;
                    new_id.to_string()
                }
            };

            let chat = query_chat(&tx, &chat_id)?
                .ok_or_else(|| anyhow::anyhow!("chat {} vanished inside its own transaction", chat_id))?;
            tx.commit()?;
            Ok(chat)
        })
    }

    pub fn insert_group_chat(
        &self,
        id: &str,
        participants: &[&str],
        now: DateTime<Utc>,
    ) -> Result<Chat> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chats (id, direct_key, is_group, created_at) VALUES (?1, NULL, 1, ?2)",
                rusqlite::params![id, format_timestamp(now)],
            )?;
            insert_participants(&tx, id, participants)?;

            let chat = query_chat(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("chat {} vanished inside its own transaction", id))?;
            tx.commit()?;
            Ok(chat)
        })
    }

    /// Chats the user participates in, newest first.
    pub fn list_chats_for_user(&self, user_id: &str) -> Result<Vec<Chat>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id FROM chats c
                 JOIN chat_participants p ON p.chat_id = c.id
                 WHERE p.user_id = ?1
                 ORDER BY c.created_at DESC, c.id",
            )?;
            let ids = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut chats = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(chat) = query_chat(conn, &id)? {
                    chats.push(chat);
                }
            }
            Ok(chats)
        })
    }

    // -- Messages --

    /// Appends a message. Returns `None` if the chat does not exist.
    ///
    /// Timestamps never go backwards within a chat: if the clock reads earlier
    /// than the chat's last message, the last message's timestamp is reused.
    pub fn insert_message(
        &self,
        id: &str,
        chat_id: &str,
        sender_id: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            if !chat_exists(&tx, chat_id)? {
                return Ok(None);
            }

            let last: Option<String> = tx
                .query_row(
                    "SELECT created_at FROM messages WHERE chat_id = ?1 ORDER BY seq DESC LIMIT 1",
                    [chat_id],
                    |row| row.get(0),
                )
                .optional()?;

            let mut created_at = format_timestamp(now);
            if let Some(last) = last {
                if last > created_at {
                    created_at = last;
                }
            }

            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, body, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, chat_id, sender_id, body, created_at],
            )?;
            tx.commit()?;

            Ok(Some(MessageRow {
                id: id.to_string(),
                chat_id: chat_id.to_string(),
                sender_id: sender_id.to_string(),
                body: body.to_string(),
                created_at,
            }))
        })
    }

    /// Up to `limit` messages in ascending insertion order. Returns `None` if
    /// the chat does not exist. An unknown `before` cursor yields an empty page.
    pub fn get_messages(
        &self,
        chat_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Option<Vec<MessageRow>>> {
        self.with_conn(|conn| {
            if !chat_exists(conn, chat_id)? {
                return Ok(None);
            }
            let mut rows = query_messages(conn, chat_id, limit, before)?;
            rows.reverse();
            Ok(Some(rows))
        })
    }

    pub fn count_messages(&self, chat_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
                [chat_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

fn chat_exists(conn: &Connection, chat_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM chats WHERE id = ?1", [chat_id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn insert_participants(conn: &Connection, chat_id: &str, users: &[&str]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO chat_participants (chat_id, user_id, position) VALUES (?1, ?2, ?3)",
    )?;
    for (position, user_id) in users.iter().enumerate() {
        stmt.execute(rusqlite::params![chat_id, user_id, position as i64])?;
    }
    Ok(())
}

fn query_chat(conn: &Connection, chat_id: &str) -> Result<Option<Chat>> {
    let row = conn
        .query_row(
            "SELECT id, is_group, created_at FROM chats WHERE id = ?1",
            [chat_id],
            |row| {
                Ok(ChatRow {
                    id: row.get(0)?,
                    is_group: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT user_id FROM chat_participants WHERE chat_id = ?1 ORDER BY position",
    )?;
    let participants = stmt
        .query_map([chat_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    row.into_chat(participants).map(Some)
}

/// Newest first; the caller flips the page into ascending order.
fn query_messages(
    conn: &Connection,
    chat_id: &str,
    limit: u32,
    before: Option<&str>,
) -> Result<Vec<MessageRow>> {
    let map_row = |row: &rusqlite::Row<'_>| {
        Ok(MessageRow {
            id: row.get(0)?,
            chat_id: row.get(1)?,
            sender_id: row.get(2)?,
            body: row.get(3)?,
            created_at: row.get(4)?,
        })
    };

    let rows = match before {
        Some(cursor) => {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, body, created_at
                 FROM messages
                 WHERE chat_id = ?1
                   AND seq < (SELECT seq FROM messages WHERE id = ?2 AND chat_id = ?1)
                 ORDER BY seq DESC
                 LIMIT ?3",
            )?;
            stmt.query_map(rusqlite::params![chat_id, cursor, limit], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, body, created_at
                 FROM messages
                 WHERE chat_id = ?1
                 ORDER BY seq DESC
                 LIMIT ?2",
            )?;
            stmt.query_map(rusqlite::params![chat_id, limit], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
