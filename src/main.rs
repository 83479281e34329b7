//! # docchat CLI
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the SQLite vector store |
//! | `docchat sources` | List configured repositories and credentials |
//! | `docchat harvest` | Download documentation into a dated JSONL file |
//! | `docchat index` | Chunk and embed a harvested file |
//! | `docchat search "<query>"` | Show the passages retrieval would use |
//! | `docchat ask "<question>"` | Answer one question and exit |
//! | `docchat chat` | Interactive question answering |
//!
//! ## Examples
//!
//! ```bash
//! # Harvest for a fixed date and keep a tarball
//! GITHUB_TOKEN=... docchat harvest --date 2024-01-31
//!
//! # Rebuild the index from a specific file
//! docchat index --input data/documentation_en_2024_01_31.jsonl --reindex
//!
//! # Chat without conversation memory
//! OPENAI_API_KEY=... docchat chat --mode qa
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docchat::progress::ProgressMode;
use docchat::{chat, config, harvest, index, retrieve, sources, store};

/// docchat: harvest GitHub documentation and ask questions about it.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Harvest GitHub documentation and chat with it",
    version,
    long_about = "docchat downloads markdown documentation from GitHub repositories into a \
    JSONL file, embeds it into a local SQLite vector store and answers questions about it \
    with a chat completion model."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    /// Progress output on stderr: auto, human, json, or off.
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the vector store schema. Safe to run repeatedly.
    Init,

    /// List configured repositories and whether credentials are present.
    Sources,

    /// Walk the configured repositories and write the dated JSONL file.
    ///
    /// An existing file for the same date is replaced.
    Harvest {
        /// Date stamped into the output file name (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,
    },

    /// Chunk and embed a harvested file into the vector store.
    Index {
        /// Harvested JSONL file. Defaults to `chat.dataset`, then the newest harvest.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Rebuild even if the existing index is current.
        #[arg(long)]
        reindex: bool,
    },

    /// Retrieve the passages closest to a query, without calling the LLM.
    Search {
        query: String,

        #[arg(long)]
        input: Option<PathBuf>,

        /// Number of passages (defaults to `retrieval.top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a single question and exit.
    Ask {
        question: String,

        #[arg(long)]
        input: Option<PathBuf>,

        /// `qa` or `memory` (defaults to `chat.mode`).
        #[arg(long)]
        mode: Option<String>,
    },

    /// Start an interactive chat session.
    Chat {
        #[arg(long)]
        input: Option<PathBuf>,

        /// `qa` or `memory` (defaults to `chat.mode`).
        #[arg(long)]
        mode: Option<String>,

        /// Rebuild the index before chatting.
        #[arg(long)]
        reindex: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let progress = ProgressMode::parse(&cli.progress)?.reporter();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = store::VectorStore::open(&cfg).await?;
            store.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Harvest { date } => {
            harvest::run_harvest_cmd(&cfg, date, progress.as_ref()).await?;
        }
        Commands::Index { input, reindex } => {
            index::run_index_cmd(&cfg, input, reindex, progress.as_ref()).await?;
        }
        Commands::Search {
            query,
            input,
            limit,
        } => {
            retrieve::run_search_cmd(&cfg, &query, input, limit, progress.as_ref()).await?;
        }
        Commands::Ask {
            question,
            input,
            mode,
        } => {
            chat::run_ask_cmd(&cfg, &question, input, mode, progress.as_ref()).await?;
        }
        Commands::Chat {
            input,
            mode,
            reindex,
        } => {
            chat::run_chat_cmd(&cfg, input, mode, reindex, progress.as_ref()).await?;
        }
    }

    Ok(())
}
