//! DocuDB CLI
//!
//! Command-line tools for inspecting and maintaining DocuDB databases.
//!
//! # Commands
//!
//! - `info` - Display database identity and size
//! - `get` - Print a document as JSON
//! - `changes` - List committed revisions after a sequence
//! - `compact` - Rewrite the journal to reclaim space
//! - `replicate` - Run a one-shot replication with another database

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use docudb_core::{Database, DatabaseConfig};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DocuDB command-line database tools.
#[derive(Parser)]
#[command(name = "docudb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the database
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Database name
    #[arg(global = true, short, long, default_value = "db")]
    name: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display database identity and size
    Info {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Print a document body as JSON
    Get {
        /// Document id
        id: String,
    },

    /// List committed revisions after a sequence
    Changes {
        /// Only show changes after this sequence
        #[arg(short, long, default_value = "0")]
        since: u64,

        /// Maximum number of changes
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// Rewrite the journal to reclaim space
    Compact,

    /// Replicate once with another database and wait for it to stop
    Replicate {
        /// Directory holding the other database
        #[arg(long)]
        target: PathBuf,

        /// Name of the other database
        #[arg(long, default_value = "db")]
        target_name: String,

        /// Which way documents flow
        #[arg(short, long, value_enum, default_value_t = commands::replicate::Direction::Both)]
        direction: commands::replicate::Direction,
    },

    /// Show version information
    Version,
}

/// Output format for `info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable lines
    Text,
    /// A JSON object
    Json,
}

fn open(path: Option<PathBuf>, name: &str) -> Result<Database, commands::CliError> {
    let path = path.ok_or(commands::CliError::MissingPath)?;
    let config = DatabaseConfig::new().directory(path).create_if_missing(false);
    Ok(Database::open(name, config)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut out = io::stdout().lock();
    match cli.command {
        Commands::Info { format } => {
            let db = open(cli.path, &cli.name)?;
            commands::info::run(&db, format, &mut out)?;
        }
        Commands::Get { id } => {
            let db = open(cli.path, &cli.name)?;
            commands::get::run(&db, &id, &mut out)?;
        }
        Commands::Changes { since, limit } => {
            let db = open(cli.path, &cli.name)?;
            commands::changes::run(&db, since, limit, &mut out)?;
        }
        Commands::Compact => {
            let db = open(cli.path, &cli.name)?;
            commands::compact::run(&db, &mut out)?;
        }
        Commands::Replicate {
            target,
            target_name,
            direction,
        } => {
            let db = open(cli.path, &cli.name)?;
            let other = open(Some(target), &target_name)?;
            commands::replicate::run(db, other, direction, &mut out)?;
        }
        Commands::Version => {
            println!("DocuDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("DocuDB Core v{}", docudb_core::VERSION);
        }
    }

    Ok(())
}
