//! v001 -- Initial schema creation.
//!
//! Creates the room, membership and message tables.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Rooms
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS rooms (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    name        TEXT NOT NULL,
    description TEXT NOT NULL,
    category    TEXT NOT NULL,
    difficulty  TEXT NOT NULL DEFAULT 'mixed',
    is_private  INTEGER NOT NULL DEFAULT 0,
    max_members INTEGER NOT NULL DEFAULT 50,
    created_by  TEXT NOT NULL,                -- opaque user id
    tags        TEXT NOT NULL DEFAULT '[]',   -- JSON array
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,                -- RFC-3339
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rooms_created ON rooms(created_at DESC);

-- ----------------------------------------------------------------
-- Room membership (ordered by join sequence)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS room_members (
    room_id      TEXT NOT NULL,
    user_id      TEXT NOT NULL,
    is_moderator INTEGER NOT NULL DEFAULT 0,
    seq          INTEGER NOT NULL,
    joined_at    TEXT NOT NULL,

    PRIMARY KEY (room_id, user_id),
    FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Messages: exactly one destination (room or direct counterpart)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id            TEXT PRIMARY KEY NOT NULL,  -- server-assigned UUID
    sender_id     TEXT NOT NULL,
    room_id       TEXT,
    receiver_id   TEXT,
    body          TEXT NOT NULL DEFAULT '',
    image         TEXT,
    kind          TEXT NOT NULL DEFAULT 'text',
    code_language TEXT,
    is_edited     INTEGER NOT NULL DEFAULT 0,
    edited_at     TEXT,
    created_at    TEXT NOT NULL,

    CHECK ((room_id IS NULL) <> (receiver_id IS NULL)),
    FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_room_ts
    ON messages(room_id, created_at);
CREATE INDEX IF NOT EXISTS idx_messages_direct_ts
    ON messages(sender_id, receiver_id, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
