/// Maximum chat message content length in bytes
pub const MAX_CONTENT_LEN: usize = 2000;

/// Maximum inbound WebSocket frame size in bytes
pub const MAX_FRAME_SIZE: usize = 4096;

/// Number of messages returned by one history request
pub const HISTORY_PAGE_SIZE: u32 = 10;

/// Default per-connection outbound mailbox capacity
pub const MAILBOX_CAPACITY: usize = 256;

/// Read-idle timeout in seconds (no frame and no pong within this window)
pub const READ_TIMEOUT_SECS: u64 = 60;

/// Per-write timeout in seconds
pub const WRITE_TIMEOUT_SECS: u64 = 10;

/// Keepalive ping period in seconds, must stay below the read timeout
pub const PING_INTERVAL_SECS: u64 = 54;

/// Default HTTP port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8088;

/// Cookie carrying the forum session identifier
pub const SESSION_COOKIE: &str = "session_id";

/// Display name used when the user directory has no entry for a sender
pub const UNKNOWN_USERNAME: &str = "Unknown";
