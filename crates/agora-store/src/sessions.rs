//! Read-only view of the forum's `sessions` table, used by the WebSocket
//! admission gate.

use agora_shared::{time, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Create a session row. Sessions are issued by the forum's login flow;
    /// this is used for fixtures and local development.
    pub fn insert_session(
        &self,
        session_id: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sessions (session_id, id, expires_at) VALUES (?1, ?2, ?3)",
            params![session_id, user_id.get(), time::format(expires_at)],
        )?;
        Ok(())
    }

    /// The user owning `session_id`, if the session exists and has not expired
    /// at `now`. Sessions without an expiry are treated as expired.
    pub fn get_session_user(&self, session_id: &str, now: DateTime<Utc>) -> Result<Option<UserId>> {
        let row: Option<(i64, Option<String>)> = self
            .conn()
            .query_row(
                "SELECT id, expires_at FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((user_id, expires_at)) = row else {
            return Ok(None);
        };

        let expires_at = expires_at.as_deref().and_then(time::parse_cursor);
        match expires_at {
            Some(expires_at) if expires_at > now => Ok(Some(UserId(user_id))),
            Some(_) => {
                tracing::debug!(user_id, "session expired");
                Ok(None)
            }
            None => {
                tracing::warn!(user_id, "session has no readable expiry");
                Ok(None)
            }
        }
    }
}
