//! Timestamp format shared by the wire protocol and the message table.
//!
//! Timestamps are written as UTC with millisecond precision and a fixed
//! width. Millisecond precision is what SQLite's `julianday` resolves, and
//! the message table orders and compares on `julianday(timestamp)` so that
//! rows stored with an offset or in SQLite's own form sort by instant too.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

/// `2024-05-01T12:30:00.000Z`
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current time truncated to the precision that survives a round trip
/// through [`format`] / [`parse_cursor`].
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn format(ts: DateTime<Utc>) -> String {
    ts.format(WIRE_FORMAT).to_string()
}

/// Parse a client-supplied or stored timestamp.
///
/// Accepts RFC 3339 with any offset (including the fixed wire form) and the
/// SQLite `CURRENT_TIMESTAMP` form `YYYY-MM-DD HH:MM:SS`, which is UTC.
pub fn parse_cursor(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // Space-separated with an explicit offset, as written by the forum's
    // session code.
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Serde adapter for `DateTime<Utc>` fields using [`WIRE_FORMAT`].
pub mod wire {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_cursor(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
