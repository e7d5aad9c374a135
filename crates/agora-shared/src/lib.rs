//! # agora-shared
//!
//! Types shared by the Agora chat store and server: user identifiers, the
//! JSON wire protocol spoken over the chat WebSocket, the timestamp format
//! used both on the wire and in the database, and protocol-level errors.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod time;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{decode, encode, ChatMessage, ClientFrame, Envelope, LastMessage, PresenceEntry};
pub use types::UserId;
