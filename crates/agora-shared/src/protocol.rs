//! JSON wire protocol spoken over the chat WebSocket.
//!
//! Every frame is one JSON object with a `type` discriminator. Inbound frames
//! ([`ClientFrame`]) and outbound frames ([`Envelope`]) are separate types so
//! that fields the server assigns (sender, timestamp, username) can never be
//! taken from the wire.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::MAX_CONTENT_LEN;
use crate::error::ProtocolError;
use crate::types::UserId;

/// `type` values a client may send.
const INBOUND_KINDS: &[&str] = &[
    "message",
    "typing",
    "typing_stopped",
    "get_history",
    "get_more_history",
];

/// A frame received from a client, validated at decode time.
///
/// `sender_id`, `username` and (for chat) `timestamp` are ignored if present.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Direct chat message to `receiver_id`.
    Message {
        #[serde(alias = "receiverID")]
        receiver_id: UserId,
        content: String,
    },

    /// The sender started typing in the conversation with `receiver_id`.
    Typing {
        #[serde(alias = "receiverID")]
        receiver_id: UserId,
    },

    /// The sender stopped typing.
    TypingStopped {
        #[serde(alias = "receiverID")]
        receiver_id: UserId,
    },

    /// Most recent page of the conversation with `receiver_id`.
    GetHistory {
        #[serde(alias = "receiverID")]
        receiver_id: UserId,
    },

    /// Page of messages strictly older than `timestamp`.
    GetMoreHistory {
        #[serde(alias = "receiverID")]
        receiver_id: UserId,
        #[serde(default)]
        timestamp: Option<String>,
    },
}

impl ClientFrame {
    /// Wire name of this frame's kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Message { .. } => "message",
            ClientFrame::Typing { .. } => "typing",
            ClientFrame::TypingStopped { .. } => "typing_stopped",
            ClientFrame::GetHistory { .. } => "get_history",
            ClientFrame::GetMoreHistory { .. } => "get_more_history",
        }
    }
}

/// A delivered (or persisted and replayed) chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    #[serde(with = "crate::time::wire")]
    pub timestamp: DateTime<Utc>,
    /// Display name of the sender.
    pub username: String,
}

/// One element of a history response; always tagged `"type":"message"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryItem {
    Message(ChatMessage),
}

/// The latest message of one conversation, as shown in the user list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub sender_id: UserId,
    pub content: String,
    #[serde(with = "crate::time::wire")]
    pub timestamp: DateTime<Utc>,
}

/// One entry of a presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub id: UserId,
    pub username: String,
    /// This user's latest message with each peer, keyed by peer id. Omitted
    /// when the user has no conversations.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "lastMessages")]
    pub last_messages: Option<BTreeMap<UserId, LastMessage>>,
}

impl PresenceEntry {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            last_messages: None,
        }
    }
}

/// A frame sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Chat message, delivered to the receiver and echoed to the sender.
    Message(ChatMessage),

    /// Ephemeral typing indicator.
    Typing {
        sender_id: UserId,
        receiver_id: UserId,
        username: String,
    },

    /// Ephemeral typing-stopped indicator.
    TypingStopped {
        sender_id: UserId,
        receiver_id: UserId,
        username: String,
    },

    /// Answer to `get_history`, ascending by timestamp.
    History { messages: Vec<HistoryItem> },

    /// Answer to `get_more_history`, ascending by timestamp.
    MoreHistory { messages: Vec<HistoryItem> },

    /// Full list of online users.
    UserList { users: Vec<PresenceEntry> },
}

impl Envelope {
    pub fn history(messages: Vec<ChatMessage>) -> Self {
        Envelope::History {
            messages: messages.into_iter().map(HistoryItem::Message).collect(),
        }
    }

    pub fn more_history(messages: Vec<ChatMessage>) -> Self {
        Envelope::MoreHistory {
            messages: messages.into_iter().map(HistoryItem::Message).collect(),
        }
    }
}

/// Decode and validate one inbound text frame.
pub fn decode(text: &str) -> Result<ClientFrame, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind.as_str(),
        Some(other) => {
            return Err(ProtocolError::Malformed(format!(
                "`type` must be a string, got {other}"
            )))
        }
        None => return Err(ProtocolError::Malformed("missing `type` field".into())),
    };

    if !INBOUND_KINDS.contains(&kind) {
        return Err(ProtocolError::UnknownKind(kind.to_string()));
    }

    let frame: ClientFrame =
        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    if let ClientFrame::Message { content, .. } = &frame {
        if content.trim().is_empty() {
            return Err(ProtocolError::EmptyContent);
        }
        if content.len() > MAX_CONTENT_LEN {
            return Err(ProtocolError::ContentTooLong {
                len: content.len(),
                max: MAX_CONTENT_LEN,
            });
        }
    }

    Ok(frame)
}

/// Encode one outbound envelope as a JSON text frame.
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(envelope)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn decode_chat_message_ignores_wire_sender() {
        let frame =
            decode(r#"{"type":"message","sender_id":99,"receiver_id":2,"content":"hi"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Message {
                receiver_id: UserId(2),
                content: "hi".into(),
            }
        );
    }

    #[test]
    fn decode_accepts_camel_case_receiver() {
        let frame = decode(r#"{"type":"typing","receiverID":5}"#).unwrap();
        assert_eq!(frame, ClientFrame::Typing { receiver_id: UserId(5) });
        assert_eq!(frame.kind(), "typing");
    }

    #[test]
    fn decode_more_history_cursor_is_optional() {
        let frame = decode(r#"{"type":"get_more_history","receiver_id":3}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::GetMoreHistory {
                receiver_id: UserId(3),
                timestamp: None,
            }
        );

        let frame = decode(
            r#"{"type":"get_more_history","receiver_id":3,"timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(
            frame,
            ClientFrame::GetMoreHistory { receiver_id: UserId(3), timestamp: Some(ts) } if ts.ends_with('Z')
        ));
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let err = decode(r#"{"type":"user_list","users":[]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownKind(kind) if kind == "user_list"));

        let err = decode(r#"{"type":"shout","receiver_id":1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownKind(_)));
    }

    #[test]
    fn decode_rejects_malformed_frames() {
        assert!(matches!(decode("not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(
            decode(r#"{"receiver_id":1}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode(r#"{"type":7}"#),
            Err(ProtocolError::Malformed(_))
        ));
        // Missing required content.
        assert!(matches!(
            decode(r#"{"type":"message","receiver_id":1}"#),
            Err(ProtocolError::Malformed(_))
        ));
        // Missing receiver.
        assert!(matches!(
            decode(r#"{"type":"get_history"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn decode_validates_content() {
        assert!(matches!(
            decode(r#"{"type":"message","receiver_id":1,"content":"   "}"#),
            Err(ProtocolError::EmptyContent)
        ));

        let long = "x".repeat(MAX_CONTENT_LEN + 1);
        let text = format!(r#"{{"type":"message","receiver_id":1,"content":"{long}"}}"#);
        assert!(matches!(
            decode(&text),
            Err(ProtocolError::ContentTooLong { .. })
        ));
    }

    #[test]
    fn encode_chat_message_shape() {
        let envelope = Envelope::Message(ChatMessage {
            sender_id: UserId(1),
            receiver_id: UserId(2),
            content: "hi".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            username: "alice".into(),
        });

        let value: Value = serde_json::from_str(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "message",
                "sender_id": 1,
                "receiver_id": 2,
                "content": "hi",
                "timestamp": "2024-05-01T10:00:00.000Z",
                "username": "alice",
            })
        );
    }

    #[test]
    fn encode_history_tags_every_entry() {
        let msg = ChatMessage {
            sender_id: UserId(2),
            receiver_id: UserId(1),
            content: "yo".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            username: "bob".into(),
        };

        let value: Value =
            serde_json::from_str(&encode(&Envelope::more_history(vec![msg])).unwrap()).unwrap();
        assert_eq!(value["type"], "more_history");
        assert_eq!(value["messages"][0]["type"], "message");
        assert_eq!(value["messages"][0]["username"], "bob");
    }

    #[test]
    fn encode_user_list() {
        let envelope = Envelope::UserList {
            users: vec![PresenceEntry::new(UserId(1), "alice")],
        };
        let value: Value = serde_json::from_str(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "user_list", "users": [{"id": 1, "username": "alice"}]})
        );
    }

    #[test]
    fn user_list_carries_last_messages_by_peer() {
        let mut alice = PresenceEntry::new(UserId(1), "alice");
        alice.last_messages = Some(BTreeMap::from([(
            UserId(2),
            LastMessage {
                sender_id: UserId(2),
                content: "see you".into(),
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            },
        )]));
        let envelope = Envelope::UserList {
            users: vec![alice, PresenceEntry::new(UserId(3), "carol")],
        };

        let text = encode(&envelope).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value["users"][0]["last_messages"],
            serde_json::json!({"2": {"sender_id": 2, "content": "see you", "timestamp": "2024-05-01T10:00:00.000Z"}})
        );
        assert!(value["users"][1].get("last_messages").is_none());

        let parsed: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, envelope);
    }
}
