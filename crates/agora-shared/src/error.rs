use thiserror::Error;

/// A single inbound frame could not be turned into a [`ClientFrame`] (or an
/// outbound envelope could not be serialized).
///
/// Protocol errors are never fatal for the connection: the offending frame is
/// discarded and the session continues.
///
/// [`ClientFrame`]: crate::protocol::ClientFrame
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Unknown message type: {0}")]
    UnknownKind(String),

    #[error("Chat message content is empty")]
    EmptyContent,

    #[error("Chat message content too long: {len} bytes (max {max})")]
    ContentTooLong { len: usize, max: usize },

    #[error("Binary frames are not supported ({0} bytes)")]
    Binary(usize),

    #[error("Serialization error: {0}")]
    Encode(#[from] serde_json::Error),
}
