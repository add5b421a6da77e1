//! Chat session control for the weather assistant.
//!
//! This module drives one streamed exchange at a time against the backend
//! and keeps the conversation store consistent. It also provides the pieces
//! the interactive REPL is built from:
//!
//! - Streaming answers shown as they arrive
//! - Cancellation that keeps the partial answer
//! - Slash commands for session control
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: The session controller and its exchange lifecycle
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatArgsError, ChatConfig, DEFAULT_HISTORY_WINDOW, parse_location};
pub use session::{ChatSession, SessionStats};
