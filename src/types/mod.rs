// Public modules
pub mod chat_request;
pub mod chat_stream_event;
pub mod citation;
pub mod location;
pub mod message;

// Re-exports
pub use chat_request::{ChatRequest, HistoryEntry};
pub use chat_stream_event::ChatStreamEvent;
pub use citation::Citation;
pub use location::Location;
pub use message::{Message, MessageRole};
