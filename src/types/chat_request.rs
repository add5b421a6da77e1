use serde::{Deserialize, Serialize};

use crate::types::{Location, MessageRole};

/// A prior turn sent to the backend as conversational context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// Who wrote the turn.
    pub role: MessageRole,

    /// The turn's text.
    pub content: String,
}

/// Body of a `POST /chat` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// The new user message.
    pub message: String,

    /// Recent turns preceding `message`, oldest first.
    pub history: Vec<HistoryEntry>,

    /// Display name of the location the question refers to.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<String>,

    /// Latitude of the location.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lat: Option<f64>,

    /// Longitude of the location.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lon: Option<f64>,
}

impl ChatRequest {
    /// Creates a request with no location context.
    pub fn new(message: impl Into<String>, history: Vec<HistoryEntry>) -> Self {
        Self {
            message: message.into(),
            history,
            location: None,
            lat: None,
            lon: None,
        }
    }

    /// Attaches location context to the request.
    pub fn with_location(mut self, location: &Location) -> Self {
        self.location = location.name.clone();
        self.lat = Some(location.lat);
        self.lon = Some(location.lon);
        self
    }
}
