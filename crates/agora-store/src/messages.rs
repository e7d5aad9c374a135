use std::collections::HashMap;

use agora_shared::{time, UserId};
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::PersistedMessage;

const PAIR_FILTER: &str = "((sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1))";

impl Database {
    /// Append one private message and return the stored row.
    pub fn insert_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<PersistedMessage> {
        self.conn().execute(
            "INSERT INTO private_messages (sender_id, receiver_id, content, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![sender_id.get(), receiver_id.get(), content, time::format(timestamp)],
        )?;

        Ok(PersistedMessage {
            id: self.conn().last_insert_rowid(),
            sender_id,
            receiver_id,
            content: content.to_string(),
            timestamp,
        })
    }

    /// The most recent `limit` messages exchanged between `a` and `b`, in
    /// chronological order.
    pub fn get_history(&self, a: UserId, b: UserId, limit: u32) -> Result<Vec<PersistedMessage>> {
        let sql = format!(
            "SELECT id, sender_id, receiver_id, content, timestamp
             FROM private_messages
             WHERE {PAIR_FILTER}
             ORDER BY julianday(timestamp) DESC, id DESC
             LIMIT ?3"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![a.get(), b.get(), limit], row_to_message)?;

        collect_chronological(rows)
    }

    /// Like [`get_history`](Self::get_history), restricted to messages strictly
    /// older than `before`.
    pub fn get_history_before(
        &self,
        a: UserId,
        b: UserId,
        before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PersistedMessage>> {
        let sql = format!(
            "SELECT id, sender_id, receiver_id, content, timestamp
             FROM private_messages
             WHERE {PAIR_FILTER} AND julianday(timestamp) < julianday(?4)
             ORDER BY julianday(timestamp) DESC, id DESC
             LIMIT ?3"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![a.get(), b.get(), limit, time::format(before)],
            row_to_message,
        )?;

        collect_chronological(rows)
    }

    /// The latest message between `user` and each peer they have talked to.
    pub fn get_last_messages(&self, user: UserId) -> Result<HashMap<UserId, PersistedMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender_id, receiver_id, content, timestamp
             FROM private_messages
             WHERE sender_id = ?1 OR receiver_id = ?1
             ORDER BY julianday(timestamp) DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![user.get()], row_to_message)?;

        let mut latest = HashMap::new();
        for row in rows {
            let message = row?;
            let peer = if message.sender_id == user {
                message.receiver_id
            } else {
                message.sender_id
            };
            latest.entry(peer).or_insert(message);
        }
        Ok(latest)
    }

    pub fn count_messages_between(&self, a: UserId, b: UserId) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM private_messages WHERE {PAIR_FILTER}");
        let count: i64 = self
            .conn()
            .query_row(&sql, params![a.get(), b.get()], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Rows arrive newest first; callers want oldest first.
fn collect_chronological(
    rows: impl Iterator<Item = rusqlite::Result<PersistedMessage>>,
) -> Result<Vec<PersistedMessage>> {
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    messages.reverse();
    Ok(messages)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistedMessage> {
    let id: i64 = row.get(0)?;
    let sender_id: i64 = row.get(1)?;
    let receiver_id: i64 = row.get(2)?;
    let content: Option<String> = row.get(3)?;
    let ts_str: String = row.get(4)?;

    let timestamp = time::parse_cursor(&ts_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {ts_str}").into(),
        )
    })?;

    Ok(PersistedMessage {
        id,
        sender_id: UserId(sender_id),
        receiver_id: UserId(receiver_id),
        content: content.unwrap_or_default(),
        timestamp,
    })
}
