//! # ragtrace CLI
//!
//! The `ragtrace` binary loads sources, answers questions against them, and
//! serves the chat API.
//!
//! ## Usage
//!
//! ```bash
//! ragtrace --config ./config/ragtrace.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragtrace init` | Write a starter configuration file |
//! | `ragtrace load` | Fetch every configured source and list what was loaded |
//! | `ragtrace chunk` | Load and chunk the sources, print document/chunk counts |
//! | `ragtrace ask "<query>"` | Answer a query and write `response.json` |
//! | `ragtrace serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `ragtrace=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragtrace::{ask, config, ingest, server};

/// ragtrace: retrieval-augmented answers with a recorded trace.
///
/// All commands except `init` read a TOML configuration file given by
/// `--config`.
#[derive(Parser)]
#[command(
    name = "ragtrace",
    about = "ragtrace: retrieval-augmented answers with a recorded trace",
    version,
    long_about = "ragtrace loads web pages and local files, chunks and embeds them into an \
    in-memory index, and answers questions through a retrieve, format, generate pipeline \
    with an optional safety gate. Every answer is traced to response.json."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragtrace.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file to `--config`.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Load every configured source and list the documents.
    Load,

    /// Load and chunk every configured source, printing the counts.
    ///
    /// Nothing is embedded, so no provider credentials are needed.
    Chunk,

    /// Answer a query against the configured sources.
    ///
    /// Prints the answer, its sources, and the elapsed time, then writes the
    /// full trace to `<output.dir>/response.json`.
    Ask {
        /// The question to answer.
        query: String,

        /// Print the trace as JSON instead of the plain answer.
        #[arg(long)]
        json: bool,

        /// Do not write `response.json`.
        #[arg(long)]
        no_save: bool,
    },

    /// Start the HTTP server on `[server] bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragtrace=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    // Every command but `init` needs a config.
    let load = || config::load_config(&cli.config);

    match &cli.command {
        Commands::Init { force } => {
            config::write_example_config(&cli.config, *force)?;
            println!("wrote {}", cli.config.display());
        }
        Commands::Load => ingest::run_load(&load()?).await?,
        Commands::Chunk => ingest::run_chunk(&load()?).await?,
        Commands::Ask {
            query,
            json,
            no_save,
        } => ask::run_ask(&load()?, query, *json, !*no_save).await?,
        Commands::Serve => server::run_server(&load()?).await?,
    }

    Ok(())
}
