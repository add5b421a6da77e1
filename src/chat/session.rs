//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which drives one
//! request/response exchange at a time and keeps the conversation store
//! consistent however that exchange ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::chat::config::ChatConfig;
use crate::client::ChatTransport;
use crate::client_logger::ChatLogger;
use crate::observability::{SESSION_CANCELLATIONS, SESSION_EXCHANGES, SESSION_EXCHANGE_DURATION};
use crate::store::{ConversationSnapshot, ConversationStore};
use crate::types::{ChatRequest, ChatStreamEvent, Citation, Location};

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    /// The number of messages in the conversation.
    pub message_count: usize,
    /// Whether an assistant message is currently streaming.
    pub streaming: bool,
    /// Number of exchanges started.
    pub exchanges: u64,
    /// Number of exchanges cancelled.
    pub cancellations: u64,
    /// Location attached to requests, if any.
    pub location: Option<Location>,
}

struct InFlight {
    exchange: u64,
    cancel: CancellationToken,
}

struct SessionState<T> {
    transport: T,
    history_window: usize,
    store: Mutex<ConversationStore>,
    in_flight: Mutex<Option<InFlight>>,
    location: Mutex<Option<Location>>,
    logger: Option<Arc<dyn ChatLogger>>,
    exchanges: AtomicU64,
    cancellations: AtomicU64,
}

/// A chat session that owns the conversation and talks to the backend.
///
/// The session is a cheap handle: clones share the same conversation, so one
/// task can await [`send_message`](Self::send_message) while another calls
/// [`cancel_stream`](Self::cancel_stream). Every store mutation goes through a
/// single lock and no lock is held across an await.
pub struct ChatSession<T: ChatTransport> {
    state: Arc<SessionState<T>>,
}

impl<T: ChatTransport> Clone for ChatSession<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: ChatTransport> ChatSession<T> {
    /// Creates a new chat session over `transport` and `store`.
    pub fn new(transport: T, store: ConversationStore, config: &ChatConfig) -> Self {
        Self::build(transport, store, config, None)
    }

    /// Creates a new chat session that reports to `logger`.
    ///
    /// The logger also receives the store's persistence failures.
    pub fn new_with_logger(
        transport: T,
        mut store: ConversationStore,
        config: &ChatConfig,
        logger: Arc<dyn ChatLogger>,
    ) -> Self {
        store.set_logger(Arc::clone(&logger));
        Self::build(transport, store, config, Some(logger))
    }

    fn build(
        transport: T,
        store: ConversationStore,
        config: &ChatConfig,
        logger: Option<Arc<dyn ChatLogger>>,
    ) -> Self {
        Self {
            state: Arc::new(SessionState {
                transport,
                history_window: config.history_window,
                store: Mutex::new(store),
                in_flight: Mutex::new(None),
                location: Mutex::new(config.location.clone()),
                logger,
                exchanges: AtomicU64::new(0),
                cancellations: AtomicU64::new(0),
            }),
        }
    }

    /// Sends a user message and streams the assistant's answer into the
    /// conversation.
    ///
    /// Does nothing if `text` is blank or another answer is still streaming.
    /// Never fails: transport and backend errors end up as text on the
    /// assistant message, and the streaming flag is always cleared when the
    /// exchange ends.
    pub async fn send_message(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let (exchange, assistant_id, cancel, request) = {
            let mut in_flight = lock(&self.state.in_flight);
            let mut store = lock(&self.state.store);
            if store.is_streaming() || in_flight.is_some() {
                return;
            }
            let history = store.history_window(self.state.history_window);
            store.append_user(text);
            let assistant_id = store.begin_assistant();

            let exchange = self.state.exchanges.fetch_add(1, Ordering::Relaxed);
            let cancel = CancellationToken::new();
            *in_flight = Some(InFlight {
                exchange,
                cancel: cancel.clone(),
            });

            let mut request = ChatRequest::new(text, history);
            if let Some(location) = lock(&self.state.location).as_ref() {
                request = request.with_location(location);
            }
            (exchange, assistant_id, cancel, request)
        };

        SESSION_EXCHANGES.click();
        if let Some(logger) = &self.state.logger {
            logger.log_request(&request);
        }
        let start = Instant::now();
        let citations = self.run_exchange(request, &cancel).await;
        self.finish_exchange(exchange, &assistant_id, &cancel, citations);
        SESSION_EXCHANGE_DURATION.add(start.elapsed().as_secs_f64());
    }

    /// Drives the transport until the exchange ends and returns the citations
    /// to finalize with.
    async fn run_exchange(&self, request: ChatRequest, cancel: &CancellationToken) -> Vec<Citation> {
        let mut events = match self.state.transport.stream_chat(request, cancel.clone()).await {
            Ok(events) => events,
            Err(err) => {
                self.append_error(cancel, &err.to_string());
                return Vec::new();
            }
        };

        let mut citations = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Vec::new(),
                next = events.next() => next,
            };
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    self.append_error(cancel, &err.to_string());
                    return Vec::new();
                }
                None => return citations,
            };
            if cancel.is_cancelled() {
                return Vec::new();
            }
            if let Some(logger) = &self.state.logger {
                logger.log_stream_event(&event);
            }
            match event {
                ChatStreamEvent::Token { content } => {
                    self.apply(cancel, |store| store.append_stream_text(&content));
                }
                ChatStreamEvent::Citations { citations: received } => {
                    citations = received;
                }
                ChatStreamEvent::Done => return citations,
                ChatStreamEvent::Error { message } => {
                    self.append_error(cancel, &message);
                    return Vec::new();
                }
            }
        }
    }

    /// Applies `f` to the store unless the exchange was cancelled.
    ///
    /// The cancellation check happens under the store lock, so a cancelled
    /// exchange can never touch a message that a later exchange opened.
    fn apply(&self, cancel: &CancellationToken, f: impl FnOnce(&mut ConversationStore)) {
        let mut store = lock(&self.state.store);
        if cancel.is_cancelled() {
            return;
        }
        f(&mut store);
    }

    fn append_error(&self, cancel: &CancellationToken, message: &str) {
        let suffix = format!("\n\nError: {message}");
        self.apply(cancel, |store| store.append_stream_text(&suffix));
    }

    /// Finalizes the exchange's assistant message exactly once.
    ///
    /// A cancelled exchange closes its message with no citations, and only if
    /// that message is still the tail of the conversation.
    fn finish_exchange(
        &self,
        exchange: u64,
        assistant_id: &str,
        cancel: &CancellationToken,
        citations: Vec<Citation>,
    ) {
        let mut in_flight = lock(&self.state.in_flight);
        let mut store = lock(&self.state.store);
        if store.last().is_some_and(|m| m.id == assistant_id) {
            let citations = if cancel.is_cancelled() {
                Vec::new()
            } else {
                citations
            };
            store.finalize_assistant(citations);
            if let (Some(logger), Some(message)) = (&self.state.logger, store.last()) {
                logger.log_exchange_complete(message);
            }
        }
        if in_flight
            .as_ref()
            .is_some_and(|flight| flight.exchange == exchange)
        {
            *in_flight = None;
        }
    }

    /// Cancels the exchange in flight, keeping whatever text already arrived.
    ///
    /// The streaming flag drops immediately; events still arriving from the
    /// cancelled response are ignored. Does nothing when no exchange is in
    /// flight.
    pub fn cancel_stream(&self) {
        let mut in_flight = lock(&self.state.in_flight);
        let Some(flight) = in_flight.take() else {
            return;
        };
        flight.cancel.cancel();
        lock(&self.state.store).set_streaming(false);
        self.state.cancellations.fetch_add(1, Ordering::Relaxed);
        SESSION_CANCELLATIONS.click();
    }

    /// Cancels any exchange in flight and empties the conversation.
    pub fn clear(&self) {
        self.cancel_stream();
        lock(&self.state.store).clear();
    }

    /// Sets or clears the location attached to subsequent requests.
    pub fn set_location(&self, location: Option<Location>) {
        *lock(&self.state.location) = location;
    }

    /// Returns the location attached to requests, if any.
    pub fn location(&self) -> Option<Location> {
        lock(&self.state.location).clone()
    }

    /// Returns true while an assistant message is streaming.
    pub fn is_streaming(&self) -> bool {
        lock(&self.state.store).is_streaming()
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        lock(&self.state.store).len()
    }

    /// Returns a copy of the conversation and streaming flag.
    pub fn snapshot(&self) -> ConversationSnapshot {
        lock(&self.state.store).snapshot()
    }

    /// Subscribes to a snapshot published after every conversation change.
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        lock(&self.state.store).subscribe()
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        let (message_count, streaming) = {
            let store = lock(&self.state.store);
            (store.len(), store.is_streaming())
        };
        SessionStats {
            message_count,
            streaming,
            exchanges: self.state.exchanges.load(Ordering::Relaxed),
            cancellations: self.state.cancellations.load(Ordering::Relaxed),
            location: self.location(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatEventStream;
    use crate::storage::{KeyValueStorage, MemoryStorage};
    use crate::store::DEFAULT_STORAGE_KEY;
    use crate::types::{HistoryEntry, MessageRole};
    use crate::{Error, Message, Result};
    use futures::stream;
    use tokio::sync::mpsc;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Events fed one at a time by the test body.
    struct ChannelStream(mpsc::UnboundedReceiver<Result<ChatStreamEvent>>);

    impl futures::Stream for ChannelStream {
        type Item = Result<ChatStreamEvent>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.0.poll_recv(cx)
        }
    }

    enum Script {
        Events(Vec<Result<ChatStreamEvent>>),
        Fail(Error),
        Channel(Mutex<Option<mpsc::UnboundedReceiver<Result<ChatStreamEvent>>>>),
    }

    struct ScriptedTransport {
        script: Script,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn events(events: Vec<ChatStreamEvent>) -> Self {
            Self::with_script(Script::Events(events.into_iter().map(Ok).collect()))
        }

        fn with_script(script: Script) -> Self {
            Self {
                script,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn channel() -> (Self, mpsc::UnboundedSender<Result<ChatStreamEvent>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let transport = Self::with_script(Script::Channel(Mutex::new(Some(rx))));
            (transport, tx)
        }
    }

    #[async_trait::async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn stream_chat(
            &self,
            request: ChatRequest,
            _cancel: CancellationToken,
        ) -> Result<ChatEventStream> {
            self.requests.lock().unwrap().push(request);
            match &self.script {
                Script::Events(events) => Ok(Box::pin(stream::iter(events.clone()))),
                Script::Fail(err) => Err(err.clone()),
                Script::Channel(rx) => {
                    let rx = rx.lock().unwrap().take().expect("channel used once");
                    Ok(Box::pin(ChannelStream(rx)))
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingLogger {
        requests: Mutex<usize>,
        events: Mutex<Vec<&'static str>>,
        completed: Mutex<Vec<Message>>,
    }

    impl ChatLogger for RecordingLogger {
        fn log_request(&self, _: &ChatRequest) {
            *self.requests.lock().unwrap() += 1;
        }

        fn log_stream_event(&self, event: &ChatStreamEvent) {
            self.events.lock().unwrap().push(event.kind());
        }

        fn log_exchange_complete(&self, message: &Message) {
            self.completed.lock().unwrap().push(message.clone());
        }

        fn log_persist_error(&self, _: &Error) {}
    }

    fn session<T: ChatTransport>(transport: T) -> (Arc<MemoryStorage>, ChatSession<T>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = ConversationStore::new(storage.clone());
        let session = ChatSession::new(transport, store, &ChatConfig::new());
        (storage, session)
    }

    fn nws() -> Citation {
        Citation::new("NWS", "Forecast discussion", 0.9)
    }

    fn last(session: &ChatSession<impl ChatTransport>) -> Message {
        session.snapshot().messages.last().cloned().unwrap()
    }

    async fn wait_for(
        rx: &mut watch::Receiver<ConversationSnapshot>,
        mut done: impl FnMut(&ConversationSnapshot) -> bool,
    ) {
        loop {
            if done(&rx.borrow_and_update()) {
                return;
            }
            rx.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn successful_exchange() {
        let (_, session) = session(ScriptedTransport::events(vec![
            ChatStreamEvent::token("Hel"),
            ChatStreamEvent::token("lo"),
            ChatStreamEvent::Citations {
                citations: vec![nws()],
            },
            ChatStreamEvent::Done,
        ]));

        session.send_message("Hi").await;

        let snapshot = session.snapshot();
        assert!(!snapshot.streaming);
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.messages[0].role, MessageRole::User);
        assert_eq!(snapshot.messages[0].content, "Hi");
        let answer = &snapshot.messages[1];
        assert_eq!(answer.role, MessageRole::Assistant);
        assert_eq!(answer.content, "Hello");
        assert_eq!(answer.citations, Some(vec![nws()]));
    }

    #[tokio::test]
    async fn backend_error_mid_stream() {
        let (_, session) = session(ScriptedTransport::events(vec![
            ChatStreamEvent::token("A"),
            ChatStreamEvent::error("timeout"),
            ChatStreamEvent::token("ignored"),
        ]));

        session.send_message("Hi").await;

        let answer = last(&session);
        assert_eq!(answer.content, "A\n\nError: timeout");
        assert_eq!(answer.citations, Some(Vec::new()));
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn error_discards_buffered_citations() {
        let (_, session) = session(ScriptedTransport::events(vec![
            ChatStreamEvent::Citations {
                citations: vec![nws()],
            },
            ChatStreamEvent::error("boom"),
        ]));

        session.send_message("Hi").await;
        assert_eq!(last(&session).citations, Some(Vec::new()));
    }

    #[tokio::test]
    async fn transport_failure_becomes_message_text() {
        let (_, session) = session(ScriptedTransport::with_script(Script::Fail(
            Error::internal_server("Internal Server Error"),
        )));

        session.send_message("Hi").await;

        let answer = last(&session);
        assert_eq!(
            answer.content,
            "\n\nError: Internal server error: Internal Server Error"
        );
        assert_eq!(answer.citations, Some(Vec::new()));
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn body_failure_becomes_message_text() {
        let transport = ScriptedTransport::with_script(Script::Events(vec![
            Ok(ChatStreamEvent::token("Part")),
            Err(Error::streaming("connection reset", None)),
        ]));
        let (_, session) = session(transport);

        session.send_message("Hi").await;

        let answer = last(&session);
        assert_eq!(answer.content, "Part\n\nError: Streaming error: connection reset");
        assert_eq!(answer.citations, Some(Vec::new()));
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn end_of_body_without_done_keeps_citations() {
        let (_, session) = session(ScriptedTransport::events(vec![
            ChatStreamEvent::token("Sunny"),
            ChatStreamEvent::Citations {
                citations: vec![nws()],
            },
        ]));

        session.send_message("Hi").await;

        let answer = last(&session);
        assert_eq!(answer.content, "Sunny");
        assert_eq!(answer.citations, Some(vec![nws()]));
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn tokens_concatenate_in_arrival_order() {
        let tokens = ["The", " high", " today", " is", " 24", "°C", "."];
        let mut events: Vec<_> = tokens.iter().map(|t| ChatStreamEvent::token(*t)).collect();
        events.push(ChatStreamEvent::Done);
        let (_, session) = session(ScriptedTransport::events(events));

        session.send_message("Forecast?").await;
        assert_eq!(last(&session).content, tokens.concat());
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let transport = ScriptedTransport::events(vec![ChatStreamEvent::Done]);
        let (storage, session) = session(transport);

        session.send_message("   \n\t").await;

        assert_eq!(session.message_count(), 0);
        assert_eq!(session.stats().exchanges, 0);
        assert_eq!(storage.get(DEFAULT_STORAGE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn input_is_trimmed() {
        let (_, session) = session(ScriptedTransport::events(vec![ChatStreamEvent::Done]));
        session.send_message("  Will it snow?  ").await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.messages[0].content, "Will it snow?");
        let requests = session.state.transport.requests.lock().unwrap();
        assert_eq!(requests[0].message, "Will it snow?");
    }

    #[tokio::test]
    async fn history_is_last_six_preceding_messages() {
        let (_, session) = session(ScriptedTransport::events(vec![
            ChatStreamEvent::token("ok"),
            ChatStreamEvent::Done,
        ]));
        {
            let mut store = lock(&session.state.store);
            for i in 0..4 {
                store.append_user(format!("q{i}"));
                store.begin_assistant();
                store.append_stream_text(&format!("a{i}"));
                store.finalize_assistant(Vec::new());
            }
        }

        session.send_message("next").await;

        let requests = session.state.transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let expected: Vec<HistoryEntry> = ["q1", "a1", "q2", "a2", "q3", "a3"]
            .iter()
            .enumerate()
            .map(|(i, content)| HistoryEntry {
                role: if i % 2 == 0 {
                    MessageRole::User
                } else {
                    MessageRole::Assistant
                },
                content: content.to_string(),
            })
            .collect();
        assert_eq!(requests[0].history, expected);
        assert_eq!(requests[0].message, "next");
    }

    #[tokio::test]
    async fn first_message_has_empty_history() {
        let (_, session) = session(ScriptedTransport::events(vec![ChatStreamEvent::Done]));
        session.send_message("Hi").await;

        let requests = session.state.transport.requests.lock().unwrap();
        assert!(requests[0].history.is_empty());
        assert!(requests[0].location.is_none());
    }

    #[tokio::test]
    async fn location_is_attached_to_requests() {
        let (_, session) = session(ScriptedTransport::events(vec![ChatStreamEvent::Done]));
        session.set_location(Some(Location::new(47.61, -122.33).with_name("Seattle")));

        session.send_message("Rain?").await;

        let requests = session.state.transport.requests.lock().unwrap();
        assert_eq!(requests[0].location.as_deref(), Some("Seattle"));
        assert_eq!(requests[0].lat, Some(47.61));
        assert_eq!(requests[0].lon, Some(-122.33));
    }

    #[tokio::test]
    async fn send_while_streaming_is_ignored() {
        let (transport, tx) = ScriptedTransport::channel();
        let (_, session) = session(transport);
        let mut rx = session.subscribe();

        let sender = session.clone();
        let first = tokio::spawn(async move { sender.send_message("first").await });
        tx.send(Ok(ChatStreamEvent::token("A"))).unwrap();
        wait_for(&mut rx, |s| s.messages.last().is_some_and(|m| m.content == "A")).await;

        let before = session.snapshot();
        session.send_message("second").await;
        assert_eq!(session.snapshot(), before);
        assert_eq!(session.state.transport.requests.lock().unwrap().len(), 1);

        tx.send(Ok(ChatStreamEvent::Done)).unwrap();
        first.await.unwrap();
        assert!(!session.is_streaming());
        assert_eq!(session.message_count(), 2);
    }

    #[tokio::test]
    async fn cancel_mid_stream() {
        let (transport, tx) = ScriptedTransport::channel();
        let (_, session) = session(transport);
        let mut rx = session.subscribe();

        let sender = session.clone();
        let exchange = tokio::spawn(async move { sender.send_message("Hi").await });
        tx.send(Ok(ChatStreamEvent::token("A"))).unwrap();
        wait_for(&mut rx, |s| s.messages.last().is_some_and(|m| m.content == "A")).await;

        session.cancel_stream();
        assert!(!session.is_streaming());
        assert_eq!(last(&session).content, "A");

        let _ = tx.send(Ok(ChatStreamEvent::token("B")));
        let _ = tx.send(Ok(ChatStreamEvent::Done));
        exchange.await.unwrap();

        let answer = last(&session);
        assert_eq!(answer.content, "A");
        assert_eq!(answer.citations, Some(Vec::new()));
        assert!(!session.is_streaming());
        assert_eq!(session.stats().cancellations, 1);
    }

    #[tokio::test]
    async fn cancel_with_nothing_in_flight_is_a_no_op() {
        let (storage, session) = session(ScriptedTransport::events(vec![
            ChatStreamEvent::token("done"),
            ChatStreamEvent::Done,
        ]));
        session.cancel_stream();
        assert_eq!(session.snapshot(), ConversationSnapshot::default());
        assert_eq!(storage.get(DEFAULT_STORAGE_KEY).unwrap(), None);

        session.send_message("Hi").await;
        let before = session.snapshot();
        let persisted = storage.get(DEFAULT_STORAGE_KEY).unwrap();

        session.cancel_stream();
        assert_eq!(session.snapshot(), before);
        assert_eq!(storage.get(DEFAULT_STORAGE_KEY).unwrap(), persisted);
        assert_eq!(session.stats().cancellations, 0);
    }

    #[tokio::test]
    async fn new_exchange_after_cancel_is_not_disturbed() {
        let (old_transport, old_tx) = ScriptedTransport::channel();
        let (_, session) = session(old_transport);
        let mut rx = session.subscribe();

        let sender = session.clone();
        let old = tokio::spawn(async move { sender.send_message("old").await });
        old_tx.send(Ok(ChatStreamEvent::token("A"))).unwrap();
        wait_for(&mut rx, |s| s.messages.last().is_some_and(|m| m.content == "A")).await;
        session.cancel_stream();

        // Open a second exchange by hand while the first task is still alive.
        let new_id = {
            let mut store = lock(&session.state.store);
            store.append_user("new");
            store.begin_assistant()
        };

        let _ = old_tx.send(Ok(ChatStreamEvent::token("stale")));
        drop(old_tx);
        old.await.unwrap();

        let snapshot = session.snapshot();
        let newest = snapshot.messages.last().unwrap();
        assert_eq!(newest.id, new_id);
        assert_eq!(newest.content, "");
        assert!(newest.citations.is_none());
        assert!(snapshot.streaming);
        assert_eq!(snapshot.messages[1].content, "A");
    }

    #[tokio::test]
    async fn clear_cancels_and_empties() {
        let (transport, tx) = ScriptedTransport::channel();
        let (storage, session) = session(transport);
        let mut rx = session.subscribe();

        let sender = session.clone();
        let exchange = tokio::spawn(async move { sender.send_message("Hi").await });
        tx.send(Ok(ChatStreamEvent::token("A"))).unwrap();
        wait_for(&mut rx, |s| s.streaming && s.messages.len() == 2).await;

        session.clear();
        let _ = tx.send(Ok(ChatStreamEvent::Done));
        exchange.await.unwrap();

        assert_eq!(session.snapshot(), ConversationSnapshot::default());
        assert_eq!(storage.get(DEFAULT_STORAGE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn logger_sees_the_exchange() {
        let logger = Arc::new(RecordingLogger::default());
        let store = ConversationStore::new(Arc::new(MemoryStorage::new()));
        let session = ChatSession::new_with_logger(
            ScriptedTransport::events(vec![
                ChatStreamEvent::token("Hi"),
                ChatStreamEvent::Citations {
                    citations: vec![nws()],
                },
                ChatStreamEvent::Done,
            ]),
            store,
            &ChatConfig::new(),
            logger.clone(),
        );

        session.send_message("Hello").await;

        assert_eq!(*logger.requests.lock().unwrap(), 1);
        assert_eq!(
            *logger.events.lock().unwrap(),
            vec!["token", "citations", "done"]
        );
        let completed = logger.completed.lock().unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].content, "Hi");
        assert_eq!(completed[0].citations, Some(vec![nws()]));
    }

    #[tokio::test]
    async fn persisted_after_exchange() {
        let (storage, session) = session(ScriptedTransport::events(vec![
            ChatStreamEvent::token("Cloudy"),
            ChatStreamEvent::Done,
        ]));
        session.send_message("Sky?").await;

        let restored = ConversationStore::load(
            storage,
            DEFAULT_STORAGE_KEY,
            crate::store::DEFAULT_PERSIST_LIMIT,
        )
        .unwrap();
        assert_eq!(restored.messages(), &session.snapshot().messages[..]);
    }
}
