//! Logging trait for chat exchanges.
//!
//! This module provides the [`ChatLogger`] trait that lets callers capture
//! every request a [`ChatSession`](crate::chat::ChatSession) issues, every
//! event it applies, and every failure that the pipeline otherwise absorbs.

use crate::{ChatRequest, ChatStreamEvent, Error, Message};

/// A trait for logging chat exchanges.
///
/// The pipeline never surfaces errors to its caller: transport failures become
/// message text and persistence failures are swallowed. A logger is the place
/// to observe them.
///
/// # Example
///
/// ```rust,ignore
/// use weatherchat::{ChatLogger, ChatRequest, ChatStreamEvent, Error, Message};
///
/// struct StderrLogger;
///
/// impl ChatLogger for StderrLogger {
///     fn log_request(&self, request: &ChatRequest) {
///         eprintln!("-> {}", request.message);
///     }
///
///     fn log_stream_event(&self, event: &ChatStreamEvent) {
///         eprintln!("<- {}", event.kind());
///     }
///
///     fn log_exchange_complete(&self, message: &Message) {
///         eprintln!("== {} chars", message.content.len());
///     }
///
///     fn log_persist_error(&self, error: &Error) {
///         eprintln!("!! {error}");
///     }
/// }
/// ```
pub trait ChatLogger: Send + Sync {
    /// Log a request just before it is sent.
    fn log_request(&self, request: &ChatRequest);

    /// Log a decoded event before it is applied to the conversation.
    ///
    /// Events that arrive after the exchange was cancelled are not logged.
    fn log_stream_event(&self, event: &ChatStreamEvent);

    /// Log the assistant message an exchange finalized.
    ///
    /// Called once per exchange that still owned the tail of the conversation
    /// when it finished.
    fn log_exchange_complete(&self, message: &Message);

    /// Log a failed write of the conversation to durable storage.
    fn log_persist_error(&self, error: &Error);
}
