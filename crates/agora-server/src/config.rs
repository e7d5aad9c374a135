//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use agora_shared::constants::{
    DEFAULT_HTTP_PORT, HISTORY_PAGE_SIZE, MAILBOX_CAPACITY, MAX_FRAME_SIZE, PING_INTERVAL_SECS,
    READ_TIMEOUT_SECS, SESSION_COOKIE, WRITE_TIMEOUT_SECS,
};

use crate::agent::AgentLimits;
use crate::connection::ConnectionLimits;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8088`
    pub http_addr: SocketAddr,

    /// Path of the forum SQLite database.
    /// Env: `DATABASE_PATH`
    /// Default: `./forum.db`
    pub database_path: PathBuf,

    /// Outbound mailbox capacity per connection. Messages beyond this are
    /// dropped for that recipient.
    /// Env: `MAILBOX_CAPACITY`
    /// Default: `256`
    pub mailbox_capacity: usize,

    /// A connection that sends nothing (not even a pong) for this long is
    /// considered dead.
    /// Env: `READ_TIMEOUT_SECS`
    /// Default: `60`
    pub read_timeout: Duration,

    /// Upper bound for one write + flush to the socket.
    /// Env: `WRITE_TIMEOUT_SECS`
    /// Default: `10`
    pub write_timeout: Duration,

    /// Keepalive ping period. Must be shorter than `read_timeout`.
    /// Env: `PING_INTERVAL_SECS`
    /// Default: `54`
    pub ping_interval: Duration,

    /// Largest accepted inbound frame in bytes.
    /// Env: `MAX_FRAME_SIZE`
    /// Default: `4096`
    pub max_frame_size: usize,

    /// Messages returned per history request.
    /// Env: `HISTORY_PAGE_SIZE`
    /// Default: `10`
    pub history_page_size: u32,

    /// Name of the forum session cookie.
    /// Env: `SESSION_COOKIE`
    /// Default: `session_id`
    pub session_cookie: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./forum.db"),
            mailbox_capacity: MAILBOX_CAPACITY,
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(WRITE_TIMEOUT_SECS),
            ping_interval: Duration::from_secs(PING_INTERVAL_SECS),
            max_frame_size: MAX_FRAME_SIZE,
            history_page_size: HISTORY_PAGE_SIZE,
            session_cookie: SESSION_COOKIE.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = PathBuf::from(path);
            }
        }

        if let Some(n) = parse_positive(&lookup, "MAILBOX_CAPACITY") {
            config.mailbox_capacity = n as usize;
        }

        if let Some(secs) = parse_positive(&lookup, "READ_TIMEOUT_SECS") {
            config.read_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_positive(&lookup, "WRITE_TIMEOUT_SECS") {
            config.write_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_positive(&lookup, "PING_INTERVAL_SECS") {
            config.ping_interval = Duration::from_secs(secs);
        }

        if let Some(n) = parse_positive(&lookup, "MAX_FRAME_SIZE") {
            config.max_frame_size = n as usize;
        }

        if let Some(n) = parse_positive(&lookup, "HISTORY_PAGE_SIZE") {
            config.history_page_size = u32::try_from(n).unwrap_or(u32::MAX);
        }

        if let Some(name) = lookup("SESSION_COOKIE") {
            if !name.is_empty() {
                config.session_cookie = name;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config.normalize_keepalive();
        config
    }

    pub fn agent_limits(&self) -> AgentLimits {
        AgentLimits {
            mailbox_capacity: self.mailbox_capacity,
            ping_interval: self.ping_interval,
            history_page_size: self.history_page_size,
        }
    }

    pub fn connection_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            max_frame_size: self.max_frame_size,
        }
    }

    /// The keepalive ping must fire before the read deadline does, otherwise
    /// idle but healthy clients get disconnected.
    fn normalize_keepalive(&mut self) {
        if self.ping_interval >= self.read_timeout {
            let fallback = self.read_timeout * 9 / 10;
            tracing::warn!(
                ping_interval = ?self.ping_interval,
                read_timeout = ?self.read_timeout,
                fallback = ?fallback,
                "Ping interval must be shorter than the read timeout, adjusting"
            );
            self.ping_interval = fallback;
        }
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8088).into());
        assert_eq!(config.mailbox_capacity, 256);
        assert_eq!(config.history_page_size, 10);
        assert!(config.ping_interval < config.read_timeout);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/tmp/chat.db"),
            ("MAILBOX_CAPACITY", "8"),
            ("HISTORY_PAGE_SIZE", "25"),
            ("SESSION_COOKIE", "forum_sid"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, PathBuf::from("/tmp/chat.db"));
        assert_eq!(config.mailbox_capacity, 8);
        assert_eq!(config.history_page_size, 25);
        assert_eq!(config.session_cookie, "forum_sid");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("MAILBOX_CAPACITY", "0"),
            ("READ_TIMEOUT_SECS", "soon"),
        ]);
        let defaults = ServerConfig::default();
        assert_eq!(config.http_addr, defaults.http_addr);
        assert_eq!(config.mailbox_capacity, defaults.mailbox_capacity);
        assert_eq!(config.read_timeout, defaults.read_timeout);
    }

    #[test]
    fn test_ping_interval_is_kept_below_read_timeout() {
        let config = from_pairs(&[("READ_TIMEOUT_SECS", "20"), ("PING_INTERVAL_SECS", "30")]);
        assert_eq!(config.read_timeout, Duration::from_secs(20));
        assert_eq!(config.ping_interval, Duration::from_secs(18));
    }
}
