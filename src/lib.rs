// Public modules
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod render;
pub mod sse;
pub mod storage;
pub mod store;
pub mod types;
pub mod utils;

mod observability;

// Re-exports
pub use client::{ChatEventStream, ChatTransport, WeatherChatClient};
pub use client_logger::ChatLogger;
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use sse::FrameDecoder;
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::{ConversationSnapshot, ConversationStore};
pub use types::*;
