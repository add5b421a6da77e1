//! Output rendering for the chat REPL.
//!
//! This module provides a trait-based rendering abstraction so the REPL does
//! not care whether it writes styled text to a terminal or plain text to a
//! pipe. The default implementation uses ANSI escape codes to set citations
//! and errors apart from the answer text.

use std::io::{self, Stdout, Write};

use crate::types::Citation;

/// ANSI escape code for dim text (used for citations).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for source names).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Longest citation excerpt shown, in characters.
const EXCERPT_CHARS: usize = 80;

/// Trait for rendering streamed answers.
pub trait Renderer: Send {
    /// Print a chunk of answer text.
    ///
    /// This is called incrementally as tokens arrive.
    fn print_text(&mut self, text: &str);

    /// Print the sources an answer was grounded on.
    fn print_citations(&mut self, citations: &[Citation]);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when the user cancels a streaming answer.
    fn print_interrupted(&mut self);

    /// Called when an answer is complete.
    ///
    /// Used to ensure proper newlines after streaming.
    fn finish_response(&mut self);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    line_start: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer that writes to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            line_start: true,
        }
    }

    /// Consumes the renderer and returns its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        self.line_start = text.ends_with('\n');
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn newline_if_needed(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn print_text(&mut self, text: &str) {
        self.write(text);
    }

    fn print_citations(&mut self, citations: &[Citation]) {
        if citations.is_empty() {
            return;
        }
        self.newline_if_needed();
        let mut block = String::from("\n");
        block.push_str(&self.styled(ANSI_DIM, "Sources:"));
        block.push('\n');
        for (index, citation) in citations.iter().enumerate() {
            let source = self.styled(ANSI_CYAN, &citation.source);
            let excerpt = excerpt(&citation.content);
            let line = format!("  [{}] {source} ({:.2})", index + 1, citation.score);
            block.push_str(&line);
            if !excerpt.is_empty() {
                block.push(' ');
                block.push_str(&self.styled(ANSI_DIM, &excerpt));
            }
            block.push('\n');
        }
        self.write(&block);
    }

    fn print_error(&mut self, error: &str) {
        self.newline_if_needed();
        let message = self.styled(ANSI_RED, &format!("Error: {error}"));
        self.write(&format!("{message}\n"));
    }

    fn print_info(&mut self, info: &str) {
        self.newline_if_needed();
        self.write(&format!("{info}\n"));
    }

    fn print_interrupted(&mut self) {
        self.newline_if_needed();
        let message = self.styled(ANSI_DIM, "[interrupted]");
        self.write(&format!("{message}\n"));
    }

    fn finish_response(&mut self) {
        self.newline_if_needed();
    }
}

/// First line of `content`, shortened to a readable excerpt.
fn excerpt(content: &str) -> String {
    let line = content.lines().next().unwrap_or_default().trim();
    if line.chars().count() <= EXCERPT_CHARS {
        return line.to_string();
    }
    let mut short: String = line.chars().take(EXCERPT_CHARS - 1).collect();
    short.push('…');
    short
}
