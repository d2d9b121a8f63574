use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (chats + messages)");
        conn.execute_batch(
            "
            CREATE TABLE chats (
                id          TEXT PRIMARY KEY,
                -- sorted 'low:high' user pair, NULL for group chats
                direct_key  TEXT UNIQUE,
                is_group    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE chat_participants (
                chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                position    INTEGER NOT NULL,
                PRIMARY KEY (chat_id, user_id)
            );

            CREATE INDEX idx_participants_user
                ON chat_participants(user_id);

            CREATE TABLE messages (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT NOT NULL UNIQUE,
                chat_id     TEXT NOT NULL REFERENCES chats(id),
                sender_id   TEXT NOT NULL,
                body        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_chat
                ON messages(chat_id, seq);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
