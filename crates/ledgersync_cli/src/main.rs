//! LedgerSync CLI
//!
//! Command-line tools for a local ledger synced through a shared folder.
//!
//! # Commands
//!
//! - `add` - Record a new expense
//! - `delete` - Soft-delete an expense
//! - `queue` - Inspect or clear pending sync operations
//! - `merge` - Dry-run a merge of two record files
//! - `days` - List the day units the local ledger splits into
//! - `sync` - Sync the local ledger with a remote directory

mod commands;
mod dir_remote;
mod local;

use clap::{Parser, Subcommand, ValueEnum};
use ledgersync_protocol::Side;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LedgerSync command-line tools.
#[derive(Parser)]
#[command(name = "ledgersync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local data directory
    #[arg(global = true, short, long, default_value = ".ledgersync")]
    data: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a new expense
    Add(commands::add::AddArgs),

    /// Soft-delete an expense
    Delete {
        /// Id of the expense
        id: String,
    },

    /// Inspect or clear pending sync operations
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Dry-run a merge of two record files (JSON arrays or CSV day units)
    Merge {
        /// Local side
        local: PathBuf,

        /// Remote side
        remote: PathBuf,

        /// Conflict threshold in milliseconds
        #[arg(short, long)]
        threshold_ms: Option<i64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the day units of the local ledger
    Days {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Sync the local ledger with a remote directory
    Sync {
        /// Remote directory holding the day units
        #[arg(short, long)]
        remote: PathBuf,

        /// Resolve every conflict to this side instead of asking
        #[arg(short, long, value_enum)]
        prefer: Option<Prefer>,

        /// Conflict threshold in milliseconds
        #[arg(short, long)]
        threshold_ms: Option<i64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum QueueAction {
    /// Show pending operations
    Show {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Drop every pending operation
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum Prefer {
    Local,
    Remote,
}

impl From<Prefer> for Side {
    fn from(prefer: Prefer) -> Self {
        match prefer {
            Prefer::Local => Side::Local,
            Prefer::Remote => Side::Remote,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Add(args) => commands::add::run(&cli.data, args)?,
        Commands::Delete { id } => commands::delete::run(&cli.data, &id)?,
        Commands::Queue { action } => match action {
            QueueAction::Show { format } => commands::queue::show(&cli.data, &format)?,
            QueueAction::Clear => commands::queue::clear(&cli.data)?,
        },
        Commands::Merge {
            local,
            remote,
            threshold_ms,
            format,
        } => commands::merge::run(&local, &remote, threshold_ms, &format)?,
        Commands::Days { format } => commands::days::run(&cli.data, &format)?,
        Commands::Sync {
            remote,
            prefer,
            threshold_ms,
            format,
        } => commands::sync::run(
            &cli.data,
            &remote,
            prefer.map(Side::from),
            threshold_ms,
            &format,
        )?,
        Commands::Version => {
            println!("LedgerSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Queue schema v{}", ledgersync_protocol::SYNC_QUEUE_VERSION);
        }
    }

    Ok(())
}
