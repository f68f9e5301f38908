use crate::error::ChatError;
use crate::types::Binding;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum accepted chat message length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 5000;

/// Author name used for system announcements (welcome, joined, left).
pub const ADMIN_USER: &str = "admin";

/// Inbound events, internally tagged so the wire names are exactly
/// `join` / `sendMessage` / `typing`.
///
/// Join and message payloads are kept as raw JSON values: a client sending
/// a number where a string belongs should get the matching validation ack
/// from the session, not a parse error from serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Join {
        #[serde(default)]
        name: Value,
        #[serde(default)]
        room: Value,
    },
    SendMessage {
        #[serde(default)]
        text: Value,
    },
    Typing {
        #[serde(default)]
        is_typing: Value,
    },
}

/// Outbound events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Message {
        user: String,
        text: String,
        timestamp: String,
    },
    /// Full roster of a room, in join order. Sent to the whole room after
    /// every join, message and leave.
    RoomData {
        room: String,
        users: Vec<Binding>,
    },
    UserTyping {
        user: String,
        is_typing: bool,
    },
    /// Failure acknowledgement, sent only to the acting connection.
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    /// System announcement authored by "admin", stamped with the current time.
    pub fn admin(text: impl Into<String>) -> Self {
        Self::chat(ADMIN_USER, text)
    }

    /// Chat message stamped with the current time.
    pub fn chat(user: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            user: user.into(),
            text: text.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(err: &ChatError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}
