mod client;
mod commands;
mod config;
mod error;
mod logging;
mod markdown;
mod models;
mod sessions;
mod store;
mod tui;

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use client::{ChatBackend, Client};
use commands::ChatOptions;
use config::{ConfigFile, Overrides, ResolvedConfig};
use store::ConversationStore;

#[derive(Parser, Debug)]
#[command(
    name = "termpilot",
    about = "Chat with a locally running language model from the terminal",
    long_about = None,
    disable_version_flag = true,
)]
struct Args {
    /// Model name sent with every chat request
    #[arg(long, global = true, env = "TERMPILOT_MODEL")]
    model: Option<String>,

    /// Backend base URL (scheme + host)
    #[arg(long, global = true, env = "TERMPILOT_BASE_URL")]
    base_url: Option<String>,

    /// Backend port; pass an empty value to leave it out of the URL
    #[arg(long, global = true, env = "TERMPILOT_PORT")]
    port: Option<String>,

    /// API version path segment, e.g. v1
    #[arg(long, global = true, env = "TERMPILOT_API_VERSION")]
    version: Option<String>,

    /// Config file (default: ~/.termpilot.yaml)
    #[arg(long, global = true, env = "TERMPILOT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// SQLite database holding conversations
    #[arg(long, global = true, env = "TERMPILOT_DATABASE", value_name = "PATH")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Start or continue a conversation, or list what is stored
    Chat(ChatArgs),
    /// Browse and continue conversations in the terminal UI
    Ui,
    /// Print the termpilot version
    Version,
    /// Generate shell completions and print to stdout
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug)]
struct ChatArgs {
    /// List all conversations and exit
    #[arg(long)]
    list: bool,

    /// List the models the backend offers and exit
    #[arg(long)]
    list_models: bool,

    /// Continue the conversation with this id
    #[arg(long = "continue", value_name = "ID")]
    continue_id: Option<String>,

    /// Continue the most recently created conversation
    #[arg(long)]
    continue_last: bool,

    /// Print the reply as raw text, without markdown styling
    #[arg(long)]
    plain: bool,

    /// Prompt; words are joined with single spaces. Use -- before words that start with a dash
    prompt: Vec<String>,
}

impl ChatArgs {
    /// `styled_output` says whether stdout can show terminal styling.
    fn into_options(self, styled_output: bool) -> ChatOptions {
        ChatOptions {
            list: self.list,
            list_models: self.list_models,
            continue_id: self.continue_id,
            continue_last: self.continue_last,
            prompt: self.prompt,
            markdown: styled_output && !self.plain,
        }
    }
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            port: self.port.clone(),
            version: self.version.clone(),
            database: self.database.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Commands that need no config ──────────────────────────────────────────
    match &args.command {
        Cmd::Version => {
            println!("termpilot version {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Cmd::Completions { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "termpilot", &mut std::io::stdout());
            return Ok(());
        }
        Cmd::Chat(_) | Cmd::Ui => {}
    }

    let file = ConfigFile::load(args.config.as_deref())?;
    let resolved = ResolvedConfig::resolve(&file, &args.overrides(), config::data_dir());

    logging::init(&resolved.log_file)?;
    tracing::debug!(?resolved, "resolved config");

    let store = ConversationStore::open(&resolved.database)
        .with_context(|| format!("opening conversation store at {}", resolved.database.display()))?;
    let client = Client::new(resolved.backend.clone());

    let result = match args.command {
        Cmd::Chat(chat) => {
            let opts = chat.into_options(std::io::stdout().is_terminal());
            commands::run_chat(&opts, &store, &client, &mut std::io::stdout()).await
        }
        Cmd::Ui => run_ui(&store, &client).await,
        Cmd::Version | Cmd::Completions { .. } => Ok(()),
    };

    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "command failed");
    }
    client.shutdown().await;
    result
}

async fn run_ui(store: &ConversationStore, client: &Client) -> Result<()> {
    client.ensure_running().await?;
    tui::run(store, client, client.model()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_version_flag_is_api_segment() {
        let args = parse(&["termpilot", "--version", "v2", "chat", "hello"]);
        assert_eq!(args.version.as_deref(), Some("v2"));
        assert_eq!(args.overrides().version.as_deref(), Some("v2"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["termpilot", "chat", "--model", "mistral", "--port", "8080", "hi"]);
        assert_eq!(args.model.as_deref(), Some("mistral"));
        assert_eq!(args.port.as_deref(), Some("8080"));
    }

    #[test]
    fn test_chat_flags_map_to_options() {
        let args = parse(&["termpilot", "chat", "--continue", "abc12345", "why", "is", "that"]);
        let Cmd::Chat(chat) = args.command else {
            panic!("expected chat subcommand");
        };
        let opts = chat.into_options(false);
        assert_eq!(opts.continue_id.as_deref(), Some("abc12345"));
        assert_eq!(opts.prompt, vec!["why", "is", "that"]);
        assert!(!opts.markdown);
    }

    #[test]
    fn test_markdown_only_on_terminal_without_plain() {
        let chat = |argv: &[&str]| match parse(argv).command {
            Cmd::Chat(chat) => chat,
            other => panic!("expected chat subcommand, got {other:?}"),
        };
        assert!(chat(&["termpilot", "chat", "hi"]).into_options(true).markdown);
        assert!(!chat(&["termpilot", "chat", "hi"]).into_options(false).markdown);
        assert!(!chat(&["termpilot", "chat", "--plain", "hi"]).into_options(true).markdown);
    }

    #[test]
    fn test_flags_after_prompt_words() {
        let args = parse(&["termpilot", "chat", "why", "is", "that", "--continue", "abc12345"]);
        let Cmd::Chat(chat) = args.command else {
            panic!("expected chat subcommand");
        };
        assert_eq!(chat.continue_id.as_deref(), Some("abc12345"));
        assert_eq!(chat.prompt, vec!["why", "is", "that"]);

        let args = parse(&["termpilot", "chat", "hello", "--model", "mistral"]);
        assert_eq!(args.model.as_deref(), Some("mistral"));
        let Cmd::Chat(chat) = args.command else {
            panic!("expected chat subcommand");
        };
        assert_eq!(chat.prompt, vec!["hello"]);
    }

    #[test]
    fn test_double_dash_keeps_literal_flags_in_prompt() {
        let args = parse(&["termpilot", "chat", "--", "what", "does", "--list", "do"]);
        let Cmd::Chat(chat) = args.command else {
            panic!("expected chat subcommand");
        };
        assert!(!chat.list);
        assert_eq!(chat.prompt, vec!["what", "does", "--list", "do"]);
    }

    #[test]
    fn test_list_flags() {
        let args = parse(&["termpilot", "chat", "--list", "--list-models", "--continue-last"]);
        let Cmd::Chat(chat) = args.command else {
            panic!("expected chat subcommand");
        };
        assert!(chat.list && chat.list_models && chat.continue_last);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["termpilot"]).is_err());
    }

    #[test]
    fn test_completions_shell_parses() {
        let args = parse(&["termpilot", "completions", "zsh"]);
        assert!(matches!(args.command, Cmd::Completions { shell: Shell::Zsh }));
    }
}
