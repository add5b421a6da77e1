//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::store::{DEFAULT_PERSIST_LIMIT, DEFAULT_STORAGE_KEY};
use crate::types::Location;

/// Default number of prior messages sent as history.
pub const DEFAULT_HISTORY_WINDOW: usize = 6;

/// Command-line arguments for the weatherchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the assistant backend.
    #[arrrg(optional, "Backend URL (default: $WEATHERCHAT_API_URL or http://localhost:8000)", "URL")]
    pub api_url: Option<String>,

    /// Directory for the persisted conversation.
    #[arrrg(optional, "Directory to persist the conversation in (default: in-memory)", "DIR")]
    pub storage_dir: Option<String>,

    /// Location the questions refer to.
    #[arrrg(optional, "Location as LAT,LON[,NAME]", "LOCATION")]
    pub location: Option<String>,

    /// Seconds allowed for establishing a connection.
    #[arrrg(optional, "Connect timeout in seconds (default: 10)", "SECONDS")]
    pub connect_timeout: Option<u32>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Log requests and stream events to stderr.
    #[arrrg(flag, "Log requests and stream events to stderr")]
    pub verbose: bool,
}

/// Error produced when command-line arguments cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatArgsError {
    /// The `--location` value is not `LAT,LON[,NAME]`.
    InvalidLocation(String),
}

impl fmt::Display for ChatArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatArgsError::InvalidLocation(value) => {
                write!(f, "invalid location {value:?}: expected LAT,LON[,NAME]")
            }
        }
    }
}

impl std::error::Error for ChatArgsError {}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Backend base URL; `None` defers to the environment.
    pub api_url: Option<String>,

    /// Bound on establishing a connection.
    pub connect_timeout: Option<Duration>,

    /// Number of prior messages sent with each request.
    pub history_window: usize,

    /// Number of most recent messages kept in durable storage.
    pub persist_limit: usize,

    /// Key the conversation is stored under.
    pub storage_key: String,

    /// Directory for file-backed storage; `None` keeps the log in memory.
    pub storage_dir: Option<PathBuf>,

    /// Location context attached to requests.
    pub location: Option<Location>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Whether to log requests and stream events.
    pub verbose: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - History window: 6 messages
    /// - Persisted window: 50 messages under `chat-store`
    /// - Storage: in-memory
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            api_url: None,
            connect_timeout: None,
            history_window: DEFAULT_HISTORY_WINDOW,
            persist_limit: DEFAULT_PERSIST_LIMIT,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_dir: None,
            location: None,
            use_color: true,
            verbose: false,
        }
    }

    /// Sets the backend base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets how many prior messages accompany each request.
    pub fn with_history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window;
        self
    }

    /// Sets how many messages are persisted.
    pub fn with_persist_limit(mut self, persist_limit: usize) -> Self {
        self.persist_limit = persist_limit;
        self
    }

    /// Sets the storage key.
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Persists the conversation under `dir`.
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Sets the location context.
    pub fn with_location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = ChatArgsError;

    fn try_from(args: ChatArgs) -> Result<Self, Self::Error> {
        let location = match args.location {
            Some(value) => Some(
                parse_location(&value).ok_or_else(|| ChatArgsError::InvalidLocation(value))?,
            ),
            None => None,
        };

        Ok(ChatConfig {
            api_url: args.api_url,
            connect_timeout: args
                .connect_timeout
                .map(|secs| Duration::from_secs(u64::from(secs))),
            storage_dir: args.storage_dir.map(PathBuf::from),
            location,
            use_color: !args.no_color,
            verbose: args.verbose,
            ..ChatConfig::new()
        })
    }
}

/// Parses `LAT,LON[,NAME]`.
///
/// Latitude must lie in `[-90, 90]` and longitude in `[-180, 180]`.
pub fn parse_location(value: &str) -> Option<Location> {
    let mut parts = value.splitn(3, ',');
    let lat = parts.next()?.trim().parse::<f64>().ok()?;
    let lon = parts.next()?.trim().parse::<f64>().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    let location = Location::new(lat, lon);
    match parts.next().map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => Some(location.with_name(name)),
        None => Some(location),
    }
}
