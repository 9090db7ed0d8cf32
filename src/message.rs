//! Inbound chat message shape
//!
//! The transport bridge decodes its own protocol and hands the relay this minimal view.

use serde::{Deserialize, Serialize};

/// Content type of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Attachment,
    Audio,
    Contact,
    ChatHistory,
    Emoticon,
    Image,
    /// Bridges that only forward text may omit the kind
    #[default]
    Text,
    Location,
    MiniProgram,
    GroupNote,
    Transfer,
    RedEnvelope,
    Recalled,
    Url,
    Video,
    Post,
    #[serde(other)]
    Unknown,
}

/// Group chat the message was posted in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    #[serde(default)]
    pub topic: Option<String>,
}

/// A message received from the chat transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender_id: String,
    pub sender_name: String,
    /// Sent by the bot's own account
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub text: String,
    /// None for private chats
    #[serde(default)]
    pub room: Option<Room>,
}

impl InboundMessage {
    /// Plain-text private message
    pub fn private(sender_id: &str, sender_name: &str, text: &str) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            is_self: false,
            kind: MessageKind::Text,
            text: text.to_string(),
            room: None,
        }
    }

    /// Plain-text group message
    pub fn group(room_id: &str, sender_id: &str, sender_name: &str, text: &str) -> Self {
        Self {
            room: Some(Room {
                id: room_id.to_string(),
                topic: None,
            }),
            ..Self::private(sender_id, sender_name, text)
        }
    }

    pub fn is_private_chat(&self) -> bool {
        self.room.is_none()
    }

    /// Where replies go: the room for group chats, the sender otherwise
    pub fn reply_target(&self) -> &str {
        match &self.room {
            Some(room) => &room.id,
            None => &self.sender_id,
        }
    }
}
