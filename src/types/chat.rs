//! Chat message shapes and broker destinations.
//!
//! Messages travel over a STOMP broker that lives outside this crate; only the JSON bodies and
//! the destination names are modelled here.  Chat history summaries come from the REST API.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A private message delivered on [`destinations::PRIVATE_MESSAGES`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub content: String,
    pub sender: String,
    pub recipient: String,
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub is_read: Option<bool>,
}

/// Body published to [`destinations::send_private`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingChatMessage {
    pub content: String,
}

impl OutgoingChatMessage {
    /// A message with surrounding whitespace removed, or `None` if nothing is left to send.
    pub fn new(content: &str) -> Option<Self> {
        let content = content.trim();
        if content.is_empty() {
            None
        } else {
            Some(Self {
                content: content.to_string(),
            })
        }
    }
}

/// Typing indicator exchanged on the typing destinations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingStatus {
    /// Whose typing state this is.  Filled in by the server on delivery.
    #[serde(default)]
    pub sender: Option<String>,
    pub typing: bool,
}

/// One conversation in `GET /chats/summary`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub recipient_username: String,
    #[serde(default)]
    pub last_message: String,
    #[serde(default, with = "crate::utils::time::option")]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(default)]
    pub unread_count: u32,
}

impl ChatSummary {
    /// Case-insensitive match of the conversation partner against a search box query.
    pub fn matches(&self, query: &str) -> bool {
        self.recipient_username
            .to_lowercase()
            .contains(&query.trim().to_lowercase())
    }
}

/// Broker destinations.
pub mod destinations {
    /// Per-user queue on which private messages arrive.
    pub const PRIVATE_MESSAGES: &str = "/user/queue/messages";
    /// Per-user queue on which the partner's typing status arrives.
    pub const TYPING_STATUS: &str = "/user/queue/typing";

    /// Where to publish a private message for `recipient`.
    pub fn send_private(recipient: &str) -> String {
        format!("/app/chat.sendMessage.private/{recipient}")
    }

    /// Where to publish a typing status update for `recipient`.
    pub fn typing(recipient: &str) -> String {
        format!("/app/chat.typing/{recipient}")
    }
}
