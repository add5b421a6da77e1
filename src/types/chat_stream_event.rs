use serde::{Deserialize, Serialize};

use crate::types::Citation;

/// An event in a chat response stream.
///
/// Each `data: ` frame of the response body carries one of these, tagged by
/// its `type` field. A well-formed stream is zero or more `token` events, an
/// optional `citations` event, and then either `done` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ChatStreamEvent {
    /// A fragment of assistant text to append to the open message.
    #[serde(rename = "token")]
    Token {
        /// The text fragment.
        content: String,
    },

    /// Source attributions for the answer being streamed.
    #[serde(rename = "citations")]
    Citations {
        /// The citations, in backend ranking order.
        citations: Vec<Citation>,
    },

    /// Marks the successful end of the response.
    #[serde(rename = "done")]
    Done,

    /// The backend failed while producing the response.
    #[serde(rename = "error")]
    Error {
        /// Human-readable description of the failure.
        message: String,
    },
}

impl ChatStreamEvent {
    /// Creates a token event.
    pub fn token(content: impl Into<String>) -> Self {
        ChatStreamEvent::Token {
            content: content.into(),
        }
    }

    /// Creates an error event.
    pub fn error(message: impl Into<String>) -> Self {
        ChatStreamEvent::Error {
            message: message.into(),
        }
    }

    /// The wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatStreamEvent::Token { .. } => "token",
            ChatStreamEvent::Citations { .. } => "citations",
            ChatStreamEvent::Done => "done",
            ChatStreamEvent::Error { .. } => "error",
        }
    }
}
