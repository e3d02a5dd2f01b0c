// persona interactive console
// Talks to an avatar through one SessionWidget and prints media as it arrives

use anyhow::Result;
use persona_link::{
    ConnectionState, PlaybackCue, SessionWidget, WidgetUpdate, WidgetView,
};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};

pub struct InteractiveConsole {
    widget: SessionWidget,
    history: Vec<String>,
}

impl InteractiveConsole {
    pub fn new(widget: SessionWidget) -> Self {
        Self {
            widget,
            history: Vec::new(),
        }
    }

    /// Run until `exit` or end of input, then release the connection
    pub async fn run(mut self) -> Result<()> {
        self.print_banner();
        self.print_help();
        self.widget.mount()?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        self.print_prompt()?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        self.print_prompt()?;
                        continue;
                    }
                    self.history.push(line.clone());

                    match self.handle_command(&line) {
                        CommandResult::Continue => {}
                        CommandResult::Exit => break,
                        CommandResult::Success(msg) => println!("✅ {}", msg),
                        CommandResult::Error(msg) => println!("❌ Error: {}", msg),
                        CommandResult::Output(output) => println!("{}", output),
                    }
                    self.print_prompt()?;
                }
                update = self.widget.next_update() => {
                    println!("\n{}", describe_update(&update));
                    self.print_prompt()?;
                }
            }
        }

        self.widget.unmount().await;
        println!("\n👋 Goodbye!");
        Ok(())
    }

    fn print_banner(&self) {
        let config = self.widget.config();
        println!("\n╔═══════════════════════════════════════════════════╗");
        println!("║              persona interactive console          ║");
        println!("╚═══════════════════════════════════════════════════╝");
        println!();
        println!("Conversation service: {}", config.bootstrap.origin);
        println!(
            "Streaming endpoint:   {}://{}",
            config.socket.scheme, config.socket.endpoint_address
        );
        println!("Type 'help' for available commands, 'exit' to quit");
        println!();
    }

    fn print_help(&self) {
        println!("📚 Available Commands:");
        println!("  start             - Allow playback (first media needs this)");
        println!("  say <text>        - Send text to the avatar");
        println!("  status            - Show session, connection and playback state");
        println!("  history           - Show what you typed");
        println!("  help, ?           - Show this help message");
        println!("  exit, quit, q     - Exit the console");
        println!();
        println!("Any other line is sent to the avatar as is.");
        println!();
    }

    fn print_prompt(&self) -> io::Result<()> {
        let view = self.widget.view();
        let prompt = match view.session_id {
            Some(ref id) => format!("persona[{}]", id),
            None => "persona".to_string(),
        };
        print!("{}> ", prompt);
        io::stdout().flush()
    }

    fn handle_command(&mut self, line: &str) -> CommandResult {
        match ConsoleCommand::parse(line) {
            ConsoleCommand::Exit => CommandResult::Exit,
            ConsoleCommand::Help => {
                self.print_help();
                CommandResult::Continue
            }
            ConsoleCommand::Start => match self.widget.gesture() {
                Some(cue) => {
                    let text = self.widget.session().media().and_then(|media| media.text());
                    CommandResult::Output(describe_cue(&cue, text))
                }
                None => CommandResult::Success("Playback enabled".to_string()),
            },
            ConsoleCommand::Status => CommandResult::Output(describe_view(&self.widget.view())),
            ConsoleCommand::History => {
                let lines: Vec<String> = self
                    .history
                    .iter()
                    .enumerate()
                    .map(|(i, cmd)| format!("  {}: {}", i + 1, cmd))
                    .collect();
                CommandResult::Output(format!("📜 Command History:\n{}", lines.join("\n")))
            }
            ConsoleCommand::Say(text) if text.is_empty() => {
                CommandResult::Error("Usage: say <text>".to_string())
            }
            ConsoleCommand::Say(text) => match self.widget.send_text(text) {
                Ok(()) => CommandResult::Continue,
                Err(e) => CommandResult::Error(format!("Message not sent: {}", e)),
            },
        }
    }
}

enum CommandResult {
    Continue,
    Exit,
    Success(String),
    Error(String),
    Output(String),
}

#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand {
    Exit,
    Help,
    Start,
    Status,
    History,
    Say(String),
}

impl ConsoleCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        match head.to_lowercase().as_str() {
            "exit" | "quit" | "q" if rest.is_empty() => ConsoleCommand::Exit,
            "help" | "?" if rest.is_empty() => ConsoleCommand::Help,
            "start" if rest.is_empty() => ConsoleCommand::Start,
            "status" if rest.is_empty() => ConsoleCommand::Status,
            "history" if rest.is_empty() => ConsoleCommand::History,
            "say" => ConsoleCommand::Say(rest.to_string()),
            _ => ConsoleCommand::Say(line.to_string()),
        }
    }
}

fn describe_cue(cue: &PlaybackCue, text: Option<&str>) -> String {
    let PlaybackCue::Play { media_url } = cue;
    match text {
        Some(text) => format!("▶ {}\n   \"{}\"", media_url, text),
        None => format!("▶ {}", media_url),
    }
}

fn describe_update(update: &WidgetUpdate) -> String {
    match update {
        WidgetUpdate::SessionAssigned(id) => format!("🔑 Conversation {}", id),
        WidgetUpdate::BootstrapFailed(reason) => {
            format!("❌ Could not create a conversation: {}", reason)
        }
        WidgetUpdate::ConnectionOpened => "🔌 Connected".to_string(),
        WidgetUpdate::ConnectionClosed(reason) => format!("🔌 Disconnected ({:?})", reason),
        WidgetUpdate::MediaReceived {
            text, cue: Some(cue), ..
        } => describe_cue(cue, text.as_deref()),
        WidgetUpdate::MediaReceived {
            media_url,
            text,
            cue: None,
        } => match text {
            Some(text) => format!("📥 {} \"{}\" (type 'start' to play)", media_url, text),
            None => format!("📥 {} (type 'start' to play)", media_url),
        },
        WidgetUpdate::FrameIgnored(reason) => format!("⚠ Ignored message: {}", reason),
    }
}

fn describe_view(view: &WidgetView) -> String {
    let connection = match view.connection {
        Some(ConnectionState::Unopened) => "connecting",
        Some(ConnectionState::Open) => "open",
        Some(ConnectionState::Closed) => "closed",
        None => "none",
    };
    let session = view
        .session_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "Session:    {} ({:?})\nConnection: {}\nPlayback:   {:?}\nShowing:    {}",
        session,
        view.phase,
        connection,
        view.playback,
        view.media_url.as_deref().unwrap_or("-")
    )
}
