//! # Support Desk CLI (`desk`)
//!
//! ## Usage
//!
//! ```bash
//! desk --config ./config/desk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `desk init` | Create the SQLite database and run schema migrations |
//! | `desk upload <path>` | Add a file or directory to the knowledge base |
//! | `desk search "<query>"` | Show the closest knowledge base chunks |
//! | `desk status` | Counts, provider reachability and agent settings |
//! | `desk reset` | Delete every document and chunk |
//! | `desk ask "<message>"` | Send one message to the agent |
//! | `desk chat` | Interactive console |
//! | `desk serve` | Start the HTTP API |

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use support_desk::config::{load_config, Config};
use support_desk::console::{self, format_batch, format_hits, format_status};
use support_desk::service::{parse_format, SupportDesk};
use support_desk::{db, logging, migrate, server};

/// Support Desk: a retrieval-augmented customer support assistant.
///
/// Settings come from an optional TOML file, then `DESK_*` environment
/// variables, then built-in defaults.
#[derive(Parser)]
#[command(name = "desk", version, about = "Retrieval-augmented customer support assistant")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Add a document, or every supported document in a directory.
    Upload {
        path: PathBuf,

        /// Override the format detected from the file extension (txt, pdf, md, csv).
        #[arg(long)]
        format: Option<String>,
    },

    /// Search the knowledge base.
    Search {
        query: String,

        /// Number of results (defaults to `[retrieval].k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Show knowledge base counts, provider reachability and agent settings.
    Status,

    /// Delete every document and chunk from the knowledge base.
    Reset,

    /// Send one message to the agent and print the reply.
    Ask {
        message: String,

        /// Session id to continue (sessions live for one process only).
        #[arg(long)]
        session: Option<String>,
    },

    /// Start the interactive console.
    Chat,

    /// Start the HTTP API on `[server].bind`.
    Serve {
        /// Override the bind address.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    });

    let cfg = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Upload { path, format } => {
            let format = parse_format(format.as_deref())?;
            let desk = open(cfg).await?;
            let report = desk.upload(&path, format).await?;
            println!("{}", format_batch(&report));
            if report.ingested.is_empty() && !report.failed.is_empty() {
                bail!("no documents were ingested");
            }
        }
        Commands::Search { query, k } => {
            let desk = open(cfg).await?;
            let hits = desk.search(&query, k).await?;
            println!("{}", format_hits(&hits));
        }
        Commands::Status => {
            let desk = open(cfg).await?;
            println!("{}", format_status(&desk.status(None).await));
        }
        Commands::Reset => {
            let desk = open(cfg).await?;
            desk.reset_knowledge().await?;
            println!("Knowledge base cleared.");
        }
        Commands::Ask { message, session } => {
            let desk = open(cfg).await?;
            let response = desk.chat(session.as_deref(), &message).await;
            for call in &response.tool_calls {
                println!("  [{}]", call);
            }
            println!("{}", response.reply);
        }
        Commands::Chat => {
            let desk = open(cfg).await?;
            console::run_console(desk).await?;
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            let desk = open(cfg).await?;
            server::run_server(desk, &bind).await?;
        }
    }

    Ok(())
}

async fn open(cfg: Config) -> anyhow::Result<Arc<SupportDesk>> {
    Ok(Arc::new(SupportDesk::open(cfg).await?))
}
