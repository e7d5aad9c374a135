//! Rows read from and written to the forum database.

use agora_shared::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PersistedMessage
// ---------------------------------------------------------------------------

/// A single private message. Rows are append-only and never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedMessage {
    /// Insertion id; breaks ties between equal timestamps.
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    /// Server-assigned send time.
    pub timestamp: DateTime<Utc>,
}
