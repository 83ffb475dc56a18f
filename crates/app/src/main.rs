//! Command-line driver for the history progress engine.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use history_core::model::{EventId, QuizPolicy, QuizPolicyDraft, UserId};
use services::{AppServices, Clock};
use tracing_subscriber::EnvFilter;

mod commands;

const DEFAULT_DB_URL: &str = "sqlite://history.sqlite3";
const DEFAULT_LOG_DIRECTIVES: &str = "app=info,services=info,storage=info";

#[derive(Parser)]
#[command(name = "history", version, about = "Reading progress and quiz gating for history dossiers")]
struct Cli {
    /// Database URL (sqlite://path or sqlite::memory:)
    #[arg(long, env = "HISTORY_DB_URL", default_value = DEFAULT_DB_URL, global = true)]
    db: String,

    /// Policy overrides as TOML
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Learner id
    #[arg(long, default_value = "1", global = true)]
    user: u64,

    /// Freeze the clock at an RFC3339 instant
    #[arg(long, global = true)]
    now: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a question bank for an event
    Seed {
        #[arg(long)]
        event: u64,

        /// TOML file with `[[questions]]` entries; a demo bank when omitted
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show progress and whether the quiz can start
    Status {
        #[arg(long)]
        event: u64,
    },

    /// Record how far the dossier has been read (0.0 to 1.0)
    Read {
        #[arg(long)]
        event: u64,

        #[arg(long)]
        ratio: f64,
    },

    /// Take the quiz on stdin
    Quiz {
        #[arg(long)]
        event: u64,
    },

    /// Simulate a completed attempt-pack purchase
    Purchase {
        #[arg(long)]
        event: u64,

        #[arg(long, default_value = "1")]
        quantity: u32,
    },

    /// Print which events of a phase are open
    Curriculum {
        #[arg(long, default_value = "Phase 1")]
        phase: String,

        /// Comma-separated event ids in order
        #[arg(long, value_delimiter = ',')]
        events: Vec<u64>,
    },
}

#[derive(Debug)]
enum CliError {
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            CliError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for CliError {}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| CliError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(CliError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn parse_policy(raw: &str) -> Result<QuizPolicy, Box<dyn std::error::Error>> {
    let draft: QuizPolicyDraft = toml::from_str(raw)?;
    Ok(draft.validate()?)
}

fn load_policy(path: Option<&Path>) -> Result<QuizPolicy, Box<dyn std::error::Error>> {
    match path {
        Some(path) => parse_policy(&std::fs::read_to_string(path)?),
        None => Ok(QuizPolicy::default()),
    }
}

fn parse_clock(now: Option<&str>) -> Result<Clock, CliError> {
    match now {
        None => Ok(Clock::system()),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| Clock::fixed(t.with_timezone(&Utc)))
            .map_err(|_| CliError::InvalidNow {
                raw: raw.to_string(),
            }),
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let policy = load_policy(cli.policy.as_deref())?;
    let clock = parse_clock(cli.now.as_deref())?;
    let db_url = normalize_sqlite_url(&cli.db);
    prepare_sqlite_file(&db_url)?;
    tracing::debug!(%db_url, "opening database");

    let services = AppServices::new_sqlite(&db_url, clock, policy).await?;
    let user = UserId::new(cli.user);

    match cli.command {
        Commands::Seed { event, file } => {
            commands::seed(&services, EventId::new(event), file.as_deref()).await
        }
        Commands::Status { event } => commands::status(&services, user, EventId::new(event)).await,
        Commands::Read { event, ratio } => {
            commands::read(&services, user, EventId::new(event), ratio).await
        }
        Commands::Quiz { event } => commands::quiz(&services, user, EventId::new(event)).await,
        Commands::Purchase { event, quantity } => {
            commands::purchase(&services, user, EventId::new(event), quantity).await
        }
        Commands::Curriculum { phase, events } => {
            let events = events.into_iter().map(EventId::new).collect();
            commands::curriculum(&services, user, phase, events).await
        }
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVES));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
