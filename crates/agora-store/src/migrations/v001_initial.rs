//! v001 -- Initial schema creation.
//!
//! `users` and `sessions` belong to the forum and are only created here when
//! the chat core runs against a fresh file; existing tables are left as-is.
//! `private_messages` is the append-only chat log.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (forum directory)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE
);

-- ----------------------------------------------------------------
-- Sessions (issued by the forum login flow)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    id         INTEGER NOT NULL,              -- FK -> users(id)
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    expires_at DATETIME,

    FOREIGN KEY (id) REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Private messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS private_messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id   INTEGER,                      -- FK -> users(id)
    receiver_id INTEGER,                      -- FK -> users(id)
    content     TEXT,
    timestamp   DATETIME DEFAULT CURRENT_TIMESTAMP,

    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (receiver_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_private_messages_pair_ts
    ON private_messages(sender_id, receiver_id, timestamp);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
