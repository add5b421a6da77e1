//! The conversation log and its persistence.
//!
//! [`ConversationStore`] is the only place chat messages are created or
//! changed. Every applied mutation writes the most recent messages to
//! [`KeyValueStorage`] and publishes a fresh [`ConversationSnapshot`] to
//! subscribers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::client_logger::ChatLogger;
use crate::error::{Error, Result};
use crate::observability::{STORE_ERRORS, STORE_WRITES};
use crate::storage::KeyValueStorage;
use crate::types::{Citation, HistoryEntry, Message, MessageRole};
use crate::utils::time::unix_millis;

/// Key the conversation is persisted under by default.
pub const DEFAULT_STORAGE_KEY: &str = "chat-store";

/// Number of most recent messages persisted by default.
pub const DEFAULT_PERSIST_LIMIT: usize = 50;

const PERSIST_VERSION: u8 = 1;

/// An immutable view of the conversation for rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSnapshot {
    /// All messages, oldest first.
    pub messages: Vec<Message>,

    /// True while the last message is receiving tokens.
    pub streaming: bool,
}

#[derive(Serialize)]
struct PersistedConversationRef<'a> {
    version: u8,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct PersistedConversation {
    version: u8,
    messages: Vec<Message>,
}

/// The ordered chat log plus the streaming flag.
///
/// The conversation only grows, except that the content of the last message
/// may be extended while it is an assistant message and the streaming flag is
/// set. In memory it is unbounded; storage holds only the newest
/// `persist_limit` messages.
pub struct ConversationStore {
    messages: Vec<Message>,
    streaming: bool,
    storage: Arc<dyn KeyValueStorage>,
    key: String,
    persist_limit: usize,
    snapshots: watch::Sender<ConversationSnapshot>,
    logger: Option<Arc<dyn ChatLogger>>,
}

impl ConversationStore {
    /// Creates an empty store persisting under the default key.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_options(storage, DEFAULT_STORAGE_KEY, DEFAULT_PERSIST_LIMIT)
    }

    /// Creates an empty store with a custom key and persisted window.
    pub fn with_options(
        storage: Arc<dyn KeyValueStorage>,
        key: impl Into<String>,
        persist_limit: usize,
    ) -> Self {
        let (snapshots, _) = watch::channel(ConversationSnapshot::default());
        Self {
            messages: Vec::new(),
            streaming: false,
            storage,
            key: key.into(),
            persist_limit,
            snapshots,
            logger: None,
        }
    }

    /// Creates a store holding whatever conversation `storage` has under `key`.
    ///
    /// A missing or corrupt value yields an empty conversation; only a failing
    /// storage backend is an error. An assistant message left open by an
    /// interrupted run is closed with no citations.
    pub fn load(
        storage: Arc<dyn KeyValueStorage>,
        key: impl Into<String>,
        persist_limit: usize,
    ) -> Result<Self> {
        let mut store = Self::with_options(storage, key, persist_limit);
        let Some(raw) = store.storage.get(&store.key)? else {
            return Ok(store);
        };
        let persisted = match serde_json::from_str::<PersistedConversation>(&raw) {
            Ok(persisted) if persisted.version == PERSIST_VERSION => persisted,
            Ok(persisted) => {
                store.report(&Error::storage(
                    format!("unsupported conversation version {}", persisted.version),
                    Some(store.key.clone()),
                ));
                return Ok(store);
            }
            Err(err) => {
                store.report(&Error::from(err));
                return Ok(store);
            }
        };
        store.messages = persisted.messages;
        if let Some(last) = store.messages.last_mut()
            && last.is_assistant()
            && last.citations.is_none()
        {
            last.citations = Some(Vec::new());
        }
        store.publish();
        Ok(store)
    }

    /// Routes persistence failures to `logger`.
    pub fn set_logger(&mut self, logger: Arc<dyn ChatLogger>) {
        self.logger = Some(logger);
    }

    /// Appends a user message and returns its id.
    pub fn append_user(&mut self, text: impl Into<String>) -> String {
        let id = generate_id();
        self.messages
            .push(Message::new(id.clone(), MessageRole::User, text));
        self.commit();
        id
    }

    /// Appends an empty assistant message, opens it for streaming, and
    /// returns its id.
    pub fn begin_assistant(&mut self) -> String {
        let id = generate_id();
        self.messages
            .push(Message::new(id.clone(), MessageRole::Assistant, ""));
        self.streaming = true;
        self.commit();
        id
    }

    /// Extends the open assistant message with `delta`.
    ///
    /// Does nothing unless the last message is an assistant message and the
    /// streaming flag is set.
    pub fn append_stream_text(&mut self, delta: &str) {
        if !self.streaming {
            return;
        }
        let Some(index) = self.last_assistant_index() else {
            return;
        };
        let updated = self.messages[index].with_appended(delta);
        self.messages[index] = updated;
        self.commit();
    }

    /// Attaches `citations` to the last assistant message and clears the
    /// streaming flag.
    ///
    /// Does nothing unless the last message is an assistant message. Calling it
    /// twice replaces the citations, so callers finalize once per exchange.
    pub fn finalize_assistant(&mut self, citations: Vec<Citation>) {
        let Some(index) = self.last_assistant_index() else {
            return;
        };
        let updated = Message {
            citations: Some(citations),
            ..self.messages[index].clone()
        };
        self.messages[index] = updated;
        self.streaming = false;
        self.commit();
    }

    /// Empties the conversation and clears the streaming flag.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.streaming = false;
        STORE_WRITES.click();
        if let Err(err) = self.storage.remove(&self.key) {
            self.report(&err);
        }
        self.publish();
    }

    /// Overrides the streaming flag.
    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
        self.commit();
    }

    /// True while the last message is receiving tokens.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The newest message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages in memory.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if the conversation is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The last `count` messages projected to request history, oldest first.
    pub fn history_window(&self, count: usize) -> Vec<HistoryEntry> {
        let start = self.messages.len().saturating_sub(count);
        self.messages[start..]
            .iter()
            .map(Message::to_history)
            .collect()
    }

    /// The messages that storage holds after the last write.
    pub fn persisted_window(&self) -> &[Message] {
        let start = self.messages.len().saturating_sub(self.persist_limit);
        &self.messages[start..]
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            messages: self.messages.clone(),
            streaming: self.streaming,
        }
    }

    /// Subscribes to a snapshot published after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.snapshots.subscribe()
    }

    fn last_assistant_index(&self) -> Option<usize> {
        let index = self.messages.len().checked_sub(1)?;
        self.messages[index].is_assistant().then_some(index)
    }

    fn commit(&mut self) {
        self.persist();
        self.publish();
    }

    fn persist(&self) {
        STORE_WRITES.click();
        let persisted = PersistedConversationRef {
            version: PERSIST_VERSION,
            messages: self.persisted_window(),
        };
        let result = serde_json::to_string(&persisted)
            .map_err(Error::from)
            .and_then(|json| self.storage.set(&self.key, &json));
        if let Err(err) = result {
            self.report(&err);
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn report(&self, err: &Error) {
        STORE_ERRORS.click();
        if let Some(logger) = &self.logger {
            logger.log_persist_error(err);
        }
    }
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("messages", &self.messages.len())
            .field("streaming", &self.streaming)
            .field("key", &self.key)
            .field("persist_limit", &self.persist_limit)
            .finish()
    }
}

/// `msg_<unix millis>_<9 random alphanumerics>`.
fn generate_id() -> String {
    let millis = unix_millis(&OffsetDateTime::now_utc());
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("msg_{millis}_{}", &suffix[..9])
}
