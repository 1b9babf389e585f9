//! wadash CLI
//!
//! Watch and drive the WhatsApp sessions of a wadash backend from the
//! terminal. Live commands open a Socket.IO connection for their duration;
//! address-book and login commands are plain REST calls.

mod cmd_addresses;
mod cmd_auth;
mod cmd_chats;
mod cmd_config;
mod cmd_sessions;
mod live;
mod render;

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing::info;

use wadash_client::logging::{self, LogOptions};
use wadash_client::paths;
use wadash_client::settings::{Settings, DEFAULT_DASHBOARD_URL};
use wadash_client::{ApiError, Notification, Notifier, Severity};
use wadash_protocol::SortOrder;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "wadash", version, about = "Watch and drive WhatsApp sessions from the terminal")]
struct Cli {
    /// Backend base URL, e.g. http://localhost:3001
    #[arg(long, global = true, env = "WADASH_BACKEND_URL")]
    backend_url: Option<String>,

    /// Dashboard origin that verifies the login password
    #[arg(long, global = true, env = "WADASH_DASHBOARD_URL", default_value = DEFAULT_DASHBOARD_URL)]
    dashboard_url: String,

    /// Data directory (defaults to $WADASH_DATA_DIR or ~/.wadash)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Seconds to wait for the backend
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List sessions and their status
    Sessions,

    /// Stream session, log, chat and message updates until Ctrl-C
    Watch {
        /// Only show activity for this session
        #[arg(long)]
        session: Option<String>,
    },

    /// Create, pair or log out sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// Send a text message from a session
    Send {
        /// Session ID
        id: String,
        /// Recipient phone number or chat ID
        to: String,
        message: String,
    },

    /// List a session's chats
    Chats {
        /// Session ID
        id: String,
    },

    /// Show recent messages of a chat
    Messages {
        /// Session ID
        id: String,
        /// Chat ID, e.g. 628123456789@c.us
        chat_id: String,
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Manage the address book
    #[command(subcommand)]
    Addresses(AddressCommand),

    /// Log in to the dashboard and store the access token
    Login {
        /// Prompted for when omitted
        #[arg(long, env = "WADASH_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the stored access token
    Signout,

    /// Show or change saved settings
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print shell completions
    Completions { shell: Shell },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Start a new session (random ID when omitted)
    Add { id: Option<String> },
    /// Request a pairing code for logging in by phone number
    Pair { id: String, phone: String },
    /// Log a session out of WhatsApp
    Logout { id: String },
    /// Show the login QR code of a session
    Qr {
        id: String,
        /// Write the QR image to a file instead of the terminal
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum AddressCommand {
    /// List addresses
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long, value_parser = parse_sort_order)]
        sort_order: Option<SortOrder>,
    },
    /// Change an address
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone_number: Option<String>,
    },
    /// Delete an address
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print effective settings
    Show,
    /// Save the backend URL
    SetUrl { url: String },
}

fn parse_sort_order(value: &str) -> Result<SortOrder, String> {
    match value.to_ascii_lowercase().as_str() {
        "asc" => Ok(SortOrder::Asc),
        "desc" => Ok(SortOrder::Desc),
        other => Err(format!("expected asc or desc, got {other:?}")),
    }
}

/// A failure already shown to the user as a notification.
#[derive(Debug)]
pub struct Reported;

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("error already reported")
    }
}

impl std::error::Error for Reported {}

/// Resolved configuration shared by every command.
pub struct Context {
    pub data_dir: PathBuf,
    pub settings_path: PathBuf,
    pub settings: Settings,
    pub backend_url: String,
    pub dashboard_url: String,
    pub timeout: Duration,
    pub notifier: Notifier,
}

impl Context {
    pub fn save_settings(&self) -> anyhow::Result<()> {
        self.settings
            .save(&self.settings_path)
            .with_context(|| format!("could not save {}", self.settings_path.display()))
    }

    /// Publish `note` and print it; errors go to stderr.
    pub fn report(&self, note: Notification) {
        let line = render::notification(&note);
        match note.severity {
            Severity::Error | Severity::Warning => eprintln!("  {line}"),
            Severity::Info | Severity::Success => println!("  {line}"),
        }
        self.notifier.notify(note);
    }

    /// Report a failed REST call under `title` and hand back an error that
    /// `main` will not print again.
    pub fn fail(&self, title: &str, err: ApiError) -> anyhow::Error {
        self.report(err.to_notification(title));
        Reported.into()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is::<Reported>() => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "wadash", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = paths::init_data_dir(cli.data_dir.as_deref())
        .context("could not resolve the data directory")?;
    paths::ensure_dirs()
        .with_context(|| format!("could not create {}", data_dir.display()))?;
    let _logging = logging::init_logging(&LogOptions::from_env(paths::log_dir()))?;

    let settings_path = paths::settings_path();
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("could not read {}", settings_path.display()))?;
    let backend_url = settings.resolve_backend_url(cli.backend_url.as_deref());

    info!(
        component = "cli",
        event = "cli.start",
        version = VERSION,
        backend_url = %backend_url,
        data_dir = %data_dir.display(),
    );

    let mut ctx = Context {
        data_dir,
        settings_path,
        settings,
        backend_url,
        dashboard_url: cli.dashboard_url,
        timeout: Duration::from_secs(cli.timeout.max(1)),
        notifier: Notifier::default(),
    };

    match cli.command {
        Command::Sessions => cmd_sessions::list(&ctx).await,
        Command::Watch { session } => cmd_sessions::watch(&ctx, session.as_deref()).await,
        Command::Session(command) => cmd_sessions::run(&ctx, command).await,
        Command::Send { id, to, message } => cmd_sessions::send(&ctx, &id, &to, &message).await,
        Command::Chats { id } => cmd_chats::chats(&ctx, &id).await,
        Command::Messages { id, chat_id, limit } => {
            cmd_chats::messages(&ctx, &id, &chat_id, limit).await
        }
        Command::Addresses(command) => cmd_addresses::run(&ctx, command).await,
        Command::Login { password } => cmd_auth::login(&mut ctx, password).await,
        Command::Signout => cmd_auth::signout(&mut ctx),
        Command::Config(command) => cmd_config::run(&mut ctx, command),
        Command::Completions { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn session_add_id_is_optional() {
        let cli = Cli::try_parse_from(["wadash", "session", "add"]).expect("parse");
        assert!(matches!(
            cli.command,
            Command::Session(SessionCommand::Add { id: None })
        ));
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from([
            "wadash",
            "messages",
            "sales",
            "628123@c.us",
            "--limit",
            "20",
            "--backend-url",
            "http://10.0.0.2:3001",
        ])
        .expect("parse");
        assert_eq!(cli.backend_url.as_deref(), Some("http://10.0.0.2:3001"));
        match cli.command {
            Command::Messages { id, chat_id, limit } => {
                assert_eq!(id, "sales");
                assert_eq!(chat_id, "628123@c.us");
                assert_eq!(limit, Some(20));
            }
            _ => panic!("expected messages command"),
        }
    }

    fn context() -> Context {
        Context {
            data_dir: PathBuf::from("/tmp/wadash"),
            settings_path: PathBuf::from("/tmp/wadash/settings.toml"),
            settings: Settings::default(),
            backend_url: "http://localhost:3001".into(),
            dashboard_url: DEFAULT_DASHBOARD_URL.into(),
            timeout: Duration::from_secs(1),
            notifier: Notifier::default(),
        }
    }

    #[test]
    fn failed_rest_call_becomes_error_notification() {
        let ctx = context();
        let mut notes = ctx.notifier.subscribe();

        let err = ctx.fail(
            "Could not delete address",
            ApiError::Status {
                status: 404,
                message: "Address not found".into(),
            },
        );

        assert!(err.is::<Reported>());
        let note = notes.try_recv().expect("notification");
        assert_eq!(note.severity, Severity::Error);
        assert_eq!(note.title, "Could not delete address");
        assert_eq!(note.detail.as_deref(), Some("Address not found"));
    }

    #[test]
    fn success_reports_reach_subscribers() {
        let ctx = context();
        let mut notes = ctx.notifier.subscribe();
        ctx.report(Notification::success("Deleted 42"));
        let note = notes.try_recv().expect("notification");
        assert_eq!(note.severity, Severity::Success);
        assert_eq!(note.detail, None);
    }

    #[test]
    fn address_sort_order_is_validated() {
        let cli = Cli::try_parse_from(["wadash", "addresses", "list", "--sort-order", "DESC"])
            .expect("parse");
        match cli.command {
            Command::Addresses(AddressCommand::List { sort_order, page, limit, .. }) => {
                assert_eq!(sort_order, Some(SortOrder::Desc));
                assert_eq!((page, limit), (1, 10));
            }
            _ => panic!("expected addresses list"),
        }
        assert!(Cli::try_parse_from(["wadash", "addresses", "list", "--sort-order", "up"]).is_err());
    }
}
