use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use convos::cli::{self, doctor, edits, export, get, import, list, read, search, stats, sync, tools};
use convos::config::Config;
use convos::detect::SourceKind;
use convos::store::SearchQuery;
use convos::sync::SyncOptions;

#[derive(Parser)]
#[command(name = "convos")]
#[command(about = "Searchable archive of Codex, Claude Code, ChatGPT and Claude conversations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "convos.yaml", global = true)]
    config: String,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Incrementally sync every enabled source
    Sync {
        /// Repeat forever
        #[arg(short, long)]
        watch: bool,

        /// Seconds between cycles in watch mode
        #[arg(short, long)]
        interval: Option<u64>,

        #[arg(long)]
        no_claude_code: bool,

        #[arg(long)]
        no_codex: bool,

        /// Skip the ChatGPT and Claude web APIs
        #[arg(long)]
        no_web: bool,

        /// Fetch at most this many conversations per web source
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Parse and merge one export file or session directory
    Import {
        path: PathBuf,

        /// Skip detection (codex, claude-code, claude, chatgpt)
        #[arg(short, long)]
        source: Option<SourceKind>,
    },

    /// List conversations
    List {
        /// Filter by source tag
        #[arg(short, long)]
        source: Option<String>,

        /// Filter by working directory substring
        #[arg(long)]
        cwd: Option<String>,

        /// Only conversations active in the last N days
        #[arg(short, long)]
        days: Option<i64>,

        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },

    /// Read a conversation
    Read {
        /// Conversation id or prefix
        id: String,

        /// Show reasoning
        #[arg(long)]
        thinking: bool,

        /// Show tool calls
        #[arg(long)]
        tools: bool,
    },

    /// Messages after a time or a known message
    Get {
        /// Conversation id or prefix
        id: String,

        /// Only messages after this ISO-8601 timestamp
        #[arg(long)]
        since: Option<String>,

        /// Only messages after this message id (or prefix)
        #[arg(long)]
        after: Option<String>,

        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,

        /// Show reasoning
        #[arg(long)]
        thinking: bool,
    },

    /// Full-text search over messages
    Search {
        query: String,

        #[arg(short, long)]
        source: Option<String>,

        #[arg(short, long)]
        role: Option<String>,

        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// List file edits, optionally filtered by path
    Edits {
        path: Option<String>,

        #[arg(short = 'n', long, default_value_t = 30)]
        limit: usize,
    },

    /// List recent tool calls, optionally matching a name or payload
    Tools {
        query: Option<String>,

        #[arg(short = 'n', long, default_value_t = 30)]
        limit: usize,
    },

    /// Export the archive as JSON
    Export {
        /// Output file
        output: PathBuf,

        #[arg(short, long)]
        source: Option<String>,
    },

    /// Show statistics
    Stats,

    /// Check paths and browser cookies
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "convos=debug" } else { "convos=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Load config
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Sync {
            watch,
            interval,
            no_claude_code,
            no_codex,
            no_web,
            limit,
        } => {
            let options = SyncOptions {
                claude_code: !no_claude_code,
                codex: !no_codex,
                web: !no_web,
                limit,
            };
            sync::run(&config, options, watch, interval).await?;
        }
        Commands::Import { path, source } => {
            import::run(&config.database_path(), &path, source)?;
        }
        Commands::List {
            source,
            cwd,
            days,
            limit,
        } => {
            let store = cli::open_archive(&config.database_path())?;
            list::run(&store, source, cwd, days, limit)?;
        }
        Commands::Read { id, thinking, tools } => {
            let store = cli::open_archive(&config.database_path())?;
            read::run(&store, &id, thinking, tools)?;
        }
        Commands::Get {
            id,
            since,
            after,
            limit,
            thinking,
        } => {
            let store = cli::open_archive(&config.database_path())?;
            get::run(&store, &id, since, after, limit, thinking)?;
        }
        Commands::Search {
            query,
            source,
            role,
            limit,
        } => {
            let store = cli::open_archive(&config.database_path())?;
            search::run(
                &store,
                SearchQuery {
                    text: query,
                    source,
                    role,
                    limit,
                },
            )?;
        }
        Commands::Edits { path, limit } => {
            let store = cli::open_archive(&config.database_path())?;
            edits::run(&store, path, limit)?;
        }
        Commands::Tools { query, limit } => {
            let store = cli::open_archive(&config.database_path())?;
            tools::run(&store, query, limit)?;
        }
        Commands::Export { output, source } => {
            let store = cli::open_archive(&config.database_path())?;
            export::run(&store, &output, source)?;
        }
        Commands::Stats => {
            let store = cli::open_archive(&config.database_path())?;
            stats::run(&store)?;
        }
        Commands::Doctor => {
            doctor::run(&config, cli.verbose)?;
        }
    }

    Ok(())
}
