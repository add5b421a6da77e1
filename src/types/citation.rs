use serde::{Deserialize, Serialize};

/// A source attribution attached to a finished assistant message.
///
/// Citations are produced by the backend's retrieval step and arrive as a
/// single `citations` frame near the end of the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// Name of the knowledge source, e.g. "NWS".
    pub source: String,

    /// The excerpt of the source that supported the answer.
    pub content: String,

    /// Relevance score in `[0, 1]`.
    pub score: f64,
}

impl Citation {
    /// Creates a new citation.
    pub fn new(source: impl Into<String>, content: impl Into<String>, score: f64) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            score,
        }
    }
}
