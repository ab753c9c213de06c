use rusqlite::Connection;

const UP_SQL: &str = r#"
-- One reaction per user per message; re-reacting replaces the emoji.
CREATE TABLE IF NOT EXISTS reactions (
    message_id TEXT NOT NULL,              -- FK -> messages(id)
    user_id    TEXT NOT NULL,
    emoji      TEXT NOT NULL,
    created_at TEXT NOT NULL,              -- RFC-3339

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
