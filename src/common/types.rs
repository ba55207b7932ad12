use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Server ids arrive either as JSON strings or as integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(RawId::into_string)
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into_string()))
            }
        }
    };
}

opaque_id!(
    /// Authenticated user identity; one live connection per identity.
    UserId
);

opaque_id!(
    /// Server-minted conversation identity.
    ChatId
);

impl Serialize for UserId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl ChatId {
    /// `0` and the empty string are what the client sends for "new chat"; they never name one.
    pub fn is_new_marker(&self) -> bool {
        self.0.is_empty() || self.0 == "0"
    }
}

impl Serialize for ChatId {
    /// Integer ids go back on the wire as integers, matching what the server minted.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.parse::<i64>() {
            Ok(number) if number.to_string() == self.0 => serializer.serialize_i64(number),
            _ => serializer.serialize_str(&self.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub name: String,
    /// Avatar file name on the server's image host.
    #[serde(default)]
    pub img: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.username
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Local,
    Remote,
}

/// One entry of the conversation log. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub origin: Origin,
    pub created_at: DateTime<Utc>,
    pub conversation: Option<ChatId>,
}

/// Row of the conversation list served by `GET /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: ChatId,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSummary {
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => "Untitled chat",
        }
    }
}

/// Message as persisted server-side, served by `GET /chat/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMessage {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub content: String,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Reconciled view of one session, published to the front-end after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub conversation: Option<ChatId>,
    pub log: Vec<Message>,
    pub pending: bool,
    pub connection: ConnectionStatus,
    /// Conversation whose history is being fetched, if any.
    pub loading: Option<ChatId>,
}

impl SessionState {
    pub fn can_send(&self) -> bool {
        self.connection == ConnectionStatus::Connected && !self.pending
    }
}

/// Frame written to the socket: `{"content": ..., "chatId": <id> | 0}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundFrame {
    pub content: String,
    #[serde(rename = "chatId", serialize_with = "serialize_conversation")]
    pub conversation: Option<ChatId>,
}

fn serialize_conversation<S: Serializer>(
    conversation: &Option<ChatId>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match conversation {
        Some(chat_id) => chat_id.serialize(serializer),
        // 0 asks the server to mint a new conversation
        None => serializer.serialize_u8(0),
    }
}

/// Frame read from the socket: `{"chatId": <id>, "response": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "chatId", alias = "conversation")]
    pub conversation: ChatId,
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_conversation_is_sent_as_zero() {
        let frame = OutboundFrame {
            content: "hello".to_string(),
            conversation: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json, serde_json::json!({"content": "hello", "chatId": 0}));
    }

    #[test]
    fn numeric_chat_ids_keep_their_wire_type() {
        let numeric = OutboundFrame {
            content: "again".to_string(),
            conversation: Some(ChatId::from("42")),
        };
        let textual = OutboundFrame {
            content: "again".to_string(),
            conversation: Some(ChatId::from("c1")),
        };
        assert_eq!(serde_json::to_value(&numeric).unwrap()["chatId"], 42);
        assert_eq!(serde_json::to_value(&textual).unwrap()["chatId"], "c1");
    }

    #[test]
    fn inbound_frame_accepts_numeric_and_aliased_ids() {
        let numeric: InboundFrame =
            serde_json::from_str(r#"{"chatId": 9, "response": "hi"}"#).unwrap();
        assert_eq!(numeric.conversation, ChatId::from("9"));

        let aliased: InboundFrame =
            serde_json::from_str(r#"{"conversation": "c1", "response": "hi there"}"#).unwrap();
        assert_eq!(aliased.conversation, ChatId::from("c1"));
        assert_eq!(aliased.response, "hi there");
    }

    #[test]
    fn inbound_frame_without_response_is_rejected() {
        assert!(serde_json::from_str::<InboundFrame>(r#"{"chatId": 1}"#).is_err());
    }

    #[test]
    fn persisted_message_uses_camel_case_fields() {
        let message: PersistedMessage = serde_json::from_str(
            r#"{"id": 3, "content": "hey", "authorId": 11, "createdAt": "2024-05-01T10:00:00.000Z", "chatId": 5}"#,
        )
        .unwrap();
        assert_eq!(message.id, "3");
        assert_eq!(message.author_id, UserId::from("11"));
        assert_eq!(message.chat_id, ChatId::from("5"));
    }

    #[test]
    fn untitled_chats_get_a_placeholder() {
        let summary: ChatSummary = serde_json::from_str(
            r#"{"id": "c1", "title": "  ", "createdAt": "2024-05-01T10:00:00Z", "updatedAt": "2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(summary.display_title(), "Untitled chat");
    }
}
