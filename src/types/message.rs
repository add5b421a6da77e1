use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{Citation, HistoryEntry};
use crate::utils::time::now_millis;

/// Author of a chat message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

impl MessageRole {
    /// The wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the conversation log.
///
/// A message's content only changes while it is the assistant message being
/// streamed; citations are attached once when that stream is finalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Session-unique identifier.
    pub id: String,

    /// Who wrote the message.
    pub role: MessageRole,

    /// The message text.
    pub content: String,

    /// Source attributions. `None` until an assistant message is finalized.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub citations: Option<Vec<Citation>>,

    /// Creation time, persisted as unix milliseconds.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,
}

impl Message {
    /// Create a new message stamped with the current time.
    pub fn new(id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            citations: None,
            timestamp: now_millis(),
        }
    }

    /// Returns true if this message was written by the assistant.
    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    /// Returns a copy of this message with `delta` appended to its content.
    pub fn with_appended(&self, delta: &str) -> Self {
        let mut content = String::with_capacity(self.content.len() + delta.len());
        content.push_str(&self.content);
        content.push_str(delta);
        Self {
            content,
            ..self.clone()
        }
    }

    /// Projects the message to the `{role, content}` pair sent as history.
    pub fn to_history(&self) -> HistoryEntry {
        HistoryEntry {
            role: self.role,
            content: self.content.clone(),
        }
    }
}
