use crate::agent::{ AgentError, GenerationCoordinator, PresentationSink };
use crate::config::prompt::{ Intent, PromptError };
use crate::markdown::{ has_code_blocks, normalize_language, segment, Segment };

use log::{ info, warn };
use std::error::Error;
use std::io::Write;
use tokio::io::{ AsyncBufReadExt, BufReader };

const HELP: &str =
    "Commands: /intent <name> <text>, /intents, /stop, /clear, /history, /help, /quit. Anything else is sent as a chat message.";

/// Renders final assistant text with code blocks framed by their language label.
pub fn render_segments(text: &str) -> String {
    let mut out = String::new();
    for segment in segment(text) {
        match segment {
            Segment::Text(content) => {
                out.push_str(&content);
                out.push('\n');
            }
            Segment::CodeBlock { language, code } => {
                out.push_str(&format!("--- {} ---\n", normalize_language(language.as_deref())));
                if !code.is_empty() {
                    out.push_str(&code);
                    out.push('\n');
                }
                out.push_str("---\n");
            }
        }
    }
    out
}

/// Prints conversation updates to a terminal-like writer.
pub struct ConsoleSink<W: Write + Send + 'static> {
    out: W,
    streaming_text: String,
}

impl<W: Write + Send + 'static> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, streaming_text: String::new() }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            warn!("Failed to write to console: {}", e);
        }
    }
}

impl<W: Write + Send + 'static> PresentationSink for ConsoleSink<W> {
    fn on_user_turn_appended(&mut self, text: &str) {
        let first_line = text.lines().next().unwrap_or_default();
        self.write(&format!("\n[you] {}\n", first_line));
    }

    fn on_assistant_turn_started(&mut self) {
        self.streaming_text.clear();
        self.write("[gemini] ");
    }

    fn on_assistant_delta(&mut self, text: &str) {
        self.streaming_text.push_str(text);
        self.write(text);
    }

    fn on_assistant_turn_finished(&mut self) {
        let text = std::mem::take(&mut self.streaming_text);
        if has_code_blocks(&text) {
            let rendered = render_segments(&text);
            self.write(&format!("\n\n{}", rendered));
        } else {
            self.write("\n");
        }
    }

    fn on_assistant_turn_complete(&mut self, text: &str) {
        let rendered = render_segments(text);
        self.write(&format!("[gemini]\n{}", rendered));
    }

    fn on_status(&mut self, text: &str) {
        if !text.is_empty() {
            self.write(&format!("... {}\n", text));
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand {
    Empty,
    Help,
    ListIntents,
    History,
    Stop,
    Clear,
    Quit,
    Intent(Intent, String),
    Message(String),
}

pub fn parse_command(line: &str) -> Result<ReplCommand, PromptError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplCommand::Empty);
    }
    if !line.starts_with('/') {
        return Ok(ReplCommand::Message(line.to_string()));
    }

    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let command = match command {
        "/help" => ReplCommand::Help,
        "/intents" => ReplCommand::ListIntents,
        "/history" => ReplCommand::History,
        "/stop" => ReplCommand::Stop,
        "/clear" => ReplCommand::Clear,
        "/quit" | "/exit" => ReplCommand::Quit,
        "/intent" => {
            let rest = rest.trim();
            let (name, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            ReplCommand::Intent(name.parse()?, text.trim().to_string())
        }
        _ => ReplCommand::Message(line.to_string()),
    };
    Ok(command)
}

/// Reads commands from stdin until EOF or `/quit`.
pub async fn run_repl(
    coordinator: &GenerationCoordinator,
    default_intent: Intent
) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        let started = match command {
            ReplCommand::Empty => continue,
            ReplCommand::Help => {
                println!("{}", HELP);
                continue;
            }
            ReplCommand::ListIntents => {
                for intent in Intent::ALL {
                    println!("  {:<22} {}", intent.name(), intent.title());
                }
                continue;
            }
            ReplCommand::History => {
                for turn in coordinator.snapshot() {
                    println!("[{}] {}", turn.role, turn.text);
                }
                continue;
            }
            ReplCommand::Stop => {
                coordinator.request_cancel();
                continue;
            }
            ReplCommand::Clear => {
                match coordinator.clear_conversation() {
                    Ok(()) => println!("Conversation cleared."),
                    Err(e) => println!("Cannot clear: {}", e),
                }
                continue;
            }
            ReplCommand::Quit => break,
            ReplCommand::Intent(intent, text) => coordinator.send_intent(intent, &text, None),
            ReplCommand::Message(text) => coordinator.send_intent(default_intent, &text, None),
        };

        match started {
            Ok(_) => {}
            Err(AgentError::Busy) => println!("Still generating; use /stop to cancel first."),
        }
    }

    info!("Leaving chat");
    Ok(())
}
