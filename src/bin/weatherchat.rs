//! Interactive chat with the weather assistant.
//!
//! This binary provides a streaming REPL over the assistant's `/chat`
//! endpoint. Answers are printed as they stream in, followed by the sources
//! they were grounded on.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a local backend
//! weatherchat
//!
//! # Point at another backend and keep the conversation across runs
//! weatherchat --api-url http://10.0.2.2:8000 --storage-dir ~/.weatherchat
//!
//! # Ask about a specific place
//! weatherchat --location "47.61,-122.33,Seattle"
//! ```
//!
//! # Commands
//!
//! - `/help` - Show available commands
//! - `/clear` - Clear conversation history
//! - `/location <lat> <lon> [name]` - Ask about a specific place
//! - `/location clear` - Stop sending a location
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application
//!
//! Ctrl+C while an answer is streaming stops it and keeps the partial text.

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use weatherchat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, help_text,
    parse_command,
};
use weatherchat::{
    ChatLogger, ChatRequest, ChatStreamEvent, ConversationSnapshot, ConversationStore, Error,
    FileStorage, KeyValueStorage, MemoryStorage, Message, WeatherChatClient,
};

/// Logs to stderr; requests and events only when verbose.
struct StderrLogger {
    verbose: bool,
}

impl ChatLogger for StderrLogger {
    fn log_request(&self, request: &ChatRequest) {
        if self.verbose {
            eprintln!(
                "[request] {:?} with {} history entries",
                request.message,
                request.history.len()
            );
        }
    }

    fn log_stream_event(&self, event: &ChatStreamEvent) {
        if self.verbose {
            eprintln!("[event] {}", event.kind());
        }
    }

    fn log_exchange_complete(&self, message: &Message) {
        if self.verbose {
            let citations = message.citations.as_ref().map_or(0, Vec::len);
            eprintln!(
                "[done] {} chars, {citations} citations",
                message.content.chars().count()
            );
        }
    }

    fn log_persist_error(&self, error: &Error) {
        eprintln!("[storage] {error}");
    }
}

/// Main entry point for the weatherchat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("weatherchat [OPTIONS]");
    let config = ChatConfig::try_from(args)?;
    let use_color = config.use_color;

    let client = WeatherChatClient::with_options(config.api_url.clone(), config.connect_timeout)?;
    let storage: Arc<dyn KeyValueStorage> = match &config.storage_dir {
        Some(dir) => Arc::new(FileStorage::new(dir)),
        None => Arc::new(MemoryStorage::new()),
    };
    let store = ConversationStore::load(storage, config.storage_key.clone(), config.persist_limit)?;
    let restored = store.len();
    let logger = Arc::new(StderrLogger {
        verbose: config.verbose,
    });
    let session = ChatSession::new_with_logger(client.clone(), store, &config, logger);
    let mut renderer = PlainTextRenderer::with_color(use_color);
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C during an answer cancels it; at the prompt rustyline handles it.
    let handler_session = session.clone();
    ctrlc::set_handler(move || {
        handler_session.cancel_stream();
    })?;

    println!("Weather Chat ({})", client.base_url());
    if restored > 0 {
        println!("Restored {restored} messages from the previous session.");
    }
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.clear();
                            renderer.print_info("Conversation cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::Location(location) => {
                            renderer.print_info(&format!("Location set to {location}"));
                            session.set_location(Some(location));
                        }
                        ChatCommand::ClearLocation => {
                            session.set_location(None);
                            renderer.print_info("Location cleared.");
                        }
                        ChatCommand::Stats => {
                            print_stats(&session, &client, &config);
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                println!("Assistant:");
                stream_answer(&session, line, &mut renderer).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}

/// Sends `line` and prints the answer as it grows.
async fn stream_answer(
    session: &ChatSession<WeatherChatClient>,
    line: &str,
    renderer: &mut impl Renderer,
) {
    let answer_index = session.message_count() + 1;
    let cancellations = session.stats().cancellations;
    let mut updates = session.subscribe();
    let mut printed = 0;

    let sender = session.clone();
    let text = line.to_string();
    let mut exchange = tokio::spawn(async move { sender.send_message(&text).await });

    loop {
        tokio::select! {
            result = &mut exchange => {
                if let Err(err) = result {
                    renderer.print_error(&format!("exchange failed: {err}"));
                }
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                print_delta(&snapshot, answer_index, &mut printed, renderer);
            }
        }
    }

    let snapshot = session.snapshot();
    print_delta(&snapshot, answer_index, &mut printed, renderer);
    if session.stats().cancellations > cancellations {
        renderer.print_interrupted();
        return;
    }
    renderer.finish_response();
    if let Some(citations) = snapshot
        .messages
        .get(answer_index)
        .and_then(|answer| answer.citations.as_deref())
    {
        renderer.print_citations(citations);
    }
}

/// Prints whatever the answer gained since the last call.
fn print_delta(
    snapshot: &ConversationSnapshot,
    answer_index: usize,
    printed: &mut usize,
    renderer: &mut impl Renderer,
) {
    let Some(answer) = snapshot.messages.get(answer_index) else {
        return;
    };
    if let Some(delta) = answer.content.get(*printed..)
        && !delta.is_empty()
    {
        renderer.print_text(delta);
        *printed = answer.content.len();
    }
}

fn print_stats(
    session: &ChatSession<WeatherChatClient>,
    client: &WeatherChatClient,
    config: &ChatConfig,
) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Backend: {}", client.base_url());
    println!("      Messages: {}", stats.message_count);
    println!("      Exchanges: {}", stats.exchanges);
    println!("      Cancelled: {}", stats.cancellations);
    println!("      History window: {} messages", config.history_window);
    match stats.location {
        Some(location) => println!("      Location: {location}"),
        None => println!("      Location: (none)"),
    }
    match &config.storage_dir {
        Some(dir) => println!("      Storage: {}", dir.display()),
        None => println!("      Storage: (in-memory)"),
    }
}
