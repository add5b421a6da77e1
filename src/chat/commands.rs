//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending messages
//! to the assistant.

use crate::chat::config::parse_location;
use crate::types::Location;

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Clear the conversation history.
    Clear,

    /// Attach a location to subsequent questions.
    Location(Location),

    /// Stop attaching a location.
    ClearLocation,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Display session statistics.
    Stats,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use weatherchat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/location 47.6 -122.3 Seattle").is_some());
/// assert!(parse_command("Will it rain tomorrow?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" => ChatCommand::Clear,
        "location" | "loc" => parse_location_command(argument),
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" | "status" => ChatCommand::Stats,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

fn parse_location_command(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid("/location requires '<lat> <lon> [name]' or 'clear'".to_string());
    };
    if arg.eq_ignore_ascii_case("clear") {
        return ChatCommand::ClearLocation;
    }

    let mut parts = arg.split_whitespace();
    let lat = parts.next().unwrap_or_default();
    let lon = parts.next().unwrap_or_default();
    let name = parts.collect::<Vec<_>>().join(" ");
    match parse_location(&format!("{lat},{lon},{name}")) {
        Some(location) => ChatCommand::Location(location),
        None => ChatCommand::Invalid(
            "/location expects latitude in [-90, 90] and longitude in [-180, 180]".to_string(),
        ),
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /clear                      Clear conversation history
  /location <lat> <lon> [name] Ask about a specific place
  /location clear             Stop sending a location
  /stats                      Show session statistics
  /help                       Show this help message
  /quit                       Exit the chat

Press Ctrl+C while an answer is streaming to stop it."#
}
