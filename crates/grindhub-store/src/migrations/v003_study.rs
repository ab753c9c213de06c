//! v003 -- Practice problems, daily goals, todos and study sessions.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS problems (
    id          TEXT PRIMARY KEY NOT NULL,
    title       TEXT NOT NULL,
    description TEXT NOT NULL,
    difficulty  TEXT NOT NULL,
    category    TEXT NOT NULL,
    tags        TEXT NOT NULL DEFAULT '[]',   -- JSON array
    companies   TEXT NOT NULL DEFAULT '[]',
    examples    TEXT NOT NULL DEFAULT '[]',   -- JSON array of objects
    constraints TEXT NOT NULL DEFAULT '[]',
    hints       TEXT NOT NULL DEFAULT '[]',
    solution    TEXT,                         -- JSON object
    created_by  TEXT,
    likes       INTEGER NOT NULL DEFAULT 0,
    submissions INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS daily_goals (
    user_id    TEXT PRIMARY KEY NOT NULL,
    target     INTEGER NOT NULL DEFAULT 60,   -- minutes
    current    INTEGER NOT NULL DEFAULT 0,    -- minutes
    goal_date  TEXT NOT NULL,                 -- YYYY-MM-DD
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS todos (
    id             TEXT PRIMARY KEY NOT NULL,
    user_id        TEXT NOT NULL,
    text           TEXT NOT NULL,
    priority       TEXT NOT NULL DEFAULT 'medium',
    estimated_time INTEGER NOT NULL DEFAULT 30,
    completed      INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_todos_user ON todos(user_id, created_at);

CREATE TABLE IF NOT EXISTS study_sessions (
    id         TEXT PRIMARY KEY NOT NULL,
    user_id    TEXT NOT NULL,
    problem_id TEXT,
    kind       TEXT NOT NULL,
    duration   INTEGER NOT NULL DEFAULT 0,    -- minutes
    completed  INTEGER NOT NULL DEFAULT 0,
    notes      TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_user_ts ON study_sessions(user_id, created_at DESC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
