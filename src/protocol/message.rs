use serde::{Deserialize, Serialize};

use super::Language;

/// A message on the wire. The `type` field is the discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// First frame a client sends.
    Login {
        display_name: String,
        language: Language,
    },
    Chat(ChatMessage),
    /// Live participants in registration order.
    Presence { users: Vec<PresenceEntry> },
    Error { content: String },
}

/// A chat message, inbound or outbound.
///
/// Clients send `content` and optionally `recipient`. The relay fills in
/// `sender` and `private` on delivery, and sets `translation_unavailable`
/// when the content could not be translated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub translation_unavailable: bool,
}

impl ChatMessage {
    /// A broadcast chat as a client would send it.
    pub fn broadcast(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// A directed chat as a client would send it.
    pub fn direct(content: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            recipient: Some(recipient.into()),
            ..Self::default()
        }
    }
}

/// One row of a presence list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub display_name: String,
    pub language: Language,
}

impl Message {
    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
        }
    }

    /// Short variant name for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Chat(_) => "chat",
            Self::Presence { .. } => "presence",
            Self::Error { .. } => "error",
        }
    }
}
