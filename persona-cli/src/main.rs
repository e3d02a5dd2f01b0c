// persona command line interface
// Interactive avatar conversations plus conversation history and feedback

mod console;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use persona_link::{
    AvatarSummary, Bootstrap, BootstrapMethod, ConversationApi, ConversationBootstrapper, Feedback, LinkConfig,
    MessageRecord, SessionId, SessionWidget,
};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Endpoint of the conversation service that creates a conversation for an avatar
const AVATAR_CONVERSATION_PATH: &str = "/conversation/{avatar_slug}/";

#[derive(Parser)]
#[command(name = "persona")]
#[command(about = "Talk to a remote avatar in real time", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Conversation service origin, e.g. http://localhost:8000
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Streaming endpoint as host:port
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Streaming scheme (ws or wss)
    #[arg(long, global = true)]
    scheme: Option<String>,

    /// Join an existing conversation instead of creating one
    #[arg(long, global = true)]
    conversation_id: Option<String>,

    /// Avatar to create the conversation for
    #[arg(long, global = true)]
    avatar: Option<String>,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive console (default)
    Console,

    /// Create a conversation and print its id
    Create,

    /// List the avatars offered by the conversation service
    Avatars {
        /// Output format (table, json)
        #[arg(long, short, default_value = "table")]
        format: String,
    },

    /// Show the messages of a conversation
    History {
        /// Conversation id
        conversation_id: String,

        /// Output format (table, json)
        #[arg(long, short, default_value = "table")]
        format: String,
    },

    /// Rate an avatar message
    Feedback {
        /// Message id, as shown by `history`
        message_id: i64,

        #[arg(long, value_enum)]
        thumb: Thumb,

        /// Free-form comment
        #[arg(long, default_value = "")]
        text: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Thumb {
    Up,
    Down,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(cli.verbose, &config.log_level);
    debug!("Effective configuration: {:?}", config);

    match cli.command.unwrap_or(Commands::Console) {
        Commands::Console => {
            let widget = SessionWidget::from_config(config)?;
            console::InteractiveConsole::new(widget).run().await?;
        }
        Commands::Create => {
            let bootstrapper = ConversationBootstrapper::new(&config.bootstrap)?;
            let id = bootstrapper
                .create_conversation()
                .await
                .context("Failed to create conversation")?;
            println!("{}", id);
        }
        Commands::Avatars { format } => {
            let api = ConversationApi::new(&config.bootstrap)?;
            let avatars = api.list_avatars().await?;
            print_avatars(&avatars, &format)?;
        }
        Commands::History {
            conversation_id,
            format,
        } => {
            let api = ConversationApi::new(&config.bootstrap)?;
            let id = SessionId::new(conversation_id)?;
            let messages = api.list_messages(&id).await?;
            print_messages(&messages, &format)?;
        }
        Commands::Feedback {
            message_id,
            thumb,
            text,
        } => {
            let api = ConversationApi::new(&config.bootstrap)?;
            let feedback = Feedback::new(thumb == Thumb::Up, text);
            let stored = api.send_feedback(message_id, &feedback).await?;
            println!("✅ Feedback recorded");
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
    }

    Ok(())
}

/// Defaults, then the file, then `PERSONA_LINK_*` variables, then flags
fn load_config(cli: &Cli) -> anyhow::Result<LinkConfig> {
    let mut config = match cli.config {
        Some(ref path) => LinkConfig::from_file(path)?,
        None => LinkConfig::default(),
    };
    config.apply_env()?;

    if let Some(ref origin) = cli.origin {
        config.bootstrap.origin = origin.clone();
    }
    if let Some(ref endpoint) = cli.endpoint {
        config.socket.endpoint_address = endpoint.clone();
    }
    if let Some(ref scheme) = cli.scheme {
        config.socket.scheme = scheme.parse()?;
    }
    if let Some(ref id) = cli.conversation_id {
        config.session_id = Some(id.clone());
    }
    if let Some(ref avatar) = cli.avatar {
        config.bootstrap.avatar_slug = Some(avatar.clone());
        if config.bootstrap.path == LinkConfig::default().bootstrap.path {
            config.bootstrap.path = AVATAR_CONVERSATION_PATH.to_string();
            config.bootstrap.method = BootstrapMethod::Put;
        }
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(verbose: bool, log_level: &str) {
    let level = if verbose { "debug" } else { log_level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("persona={level},persona_link={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_avatars(avatars: &[AvatarSummary], format: &str) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(avatars)?),
        "table" => {
            if avatars.is_empty() {
                println!("No avatars");
                return Ok(());
            }
            println!("{:<24} {:<24} {}", "SLUG", "NAME", "PROVIDER");
            for avatar in avatars {
                println!("{:<24} {:<24} {}", avatar.slug, avatar.name, avatar.provider);
            }
        }
        other => return Err(anyhow!("Unknown format '{}' (expected table or json)", other)),
    }
    Ok(())
}

fn print_messages(messages: &[MessageRecord], format: &str) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(messages)?),
        "table" => {
            if messages.is_empty() {
                println!("No messages");
                return Ok(());
            }
            for message in messages {
                println!("{}", format_message(message));
            }
        }
        other => return Err(anyhow!("Unknown format '{}' (expected table or json)", other)),
    }
    Ok(())
}

fn format_message(message: &MessageRecord) -> String {
    let id = message
        .id
        .map(|id| format!("#{}", id))
        .unwrap_or_else(|| "#?".to_string());
    let when = message
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    let mut line = format!(
        "{:<6} {:<19} {:?}: {}",
        id,
        when,
        message.persona_type,
        message.text.as_deref().unwrap_or("")
    );
    if let Some(ref url) = message.media_url {
        line.push_str(&format!("\n       media: {}", url));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("persona").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_config() {
        let cli = parse(&[
            "--origin",
            "https://avatars.example",
            "--endpoint",
            "avatars.example:443",
            "--scheme",
            "wss",
            "--conversation-id",
            "abc123",
        ]);
        assert!(cli.command.is_none());

        let config = load_config(&cli).unwrap();
        assert_eq!(config.bootstrap.origin, "https://avatars.example");
        assert_eq!(config.socket.endpoint_address, "avatars.example:443");
        assert_eq!(config.session_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_avatar_selects_conversation_endpoint() {
        let cli = parse(&["--avatar", "ada", "create"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.bootstrap.method, BootstrapMethod::Put);
        assert_eq!(
            config.bootstrap.bootstrap_url().unwrap().as_str(),
            "http://localhost:8000/conversation/ada/"
        );
    }

    #[test]
    fn test_invalid_flags_rejected() {
        let cli = parse(&["--endpoint", "ws://localhost:9000"]);
        assert!(load_config(&cli).is_err());

        let cli = parse(&["--scheme", "http"]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_feedback_arguments() {
        let cli = parse(&["feedback", "7", "--thumb", "down", "--text", "too fast"]);
        match cli.command {
            Some(Commands::Feedback {
                message_id,
                thumb,
                text,
            }) => {
                assert_eq!(message_id, 7);
                assert_eq!(thumb, Thumb::Down);
                assert_eq!(text, "too fast");
            }
            _ => panic!("expected feedback command"),
        }
    }

    #[test]
    fn test_avatars_arguments() {
        let cli = parse(&["avatars", "--format", "json"]);
        assert!(matches!(cli.command, Some(Commands::Avatars { ref format }) if format == "json"));

        let avatars = vec![AvatarSummary {
            name: "Ada".to_string(),
            slug: "ada".to_string(),
            provider: "did".to_string(),
        }];
        assert!(print_avatars(&avatars, "table").is_ok());
        assert!(print_avatars(&avatars, "xml").is_err());
    }

    #[test]
    fn test_format_message() {
        let message: MessageRecord = serde_json::from_value(serde_json::json!({
            "id": 2, "persona_type": "agent", "text": "Hello!",
            "media_url": "https://cdn.example/2.webm",
            "created_at": "2024-05-24T15:38:42+00:00"
        }))
        .unwrap();
        let line = format_message(&message);
        assert!(line.starts_with("#2"));
        assert!(line.contains("2024-05-24 15:38:42"));
        assert!(line.contains("Agent: Hello!"));
        assert!(line.contains("media: https://cdn.example/2.webm"));
    }
}
