use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ragbox::Result;
use ragbox::commands::{chat_folder, index_folder, query_folder, show_status};
use ragbox::config::Config;

#[derive(Parser)]
#[command(name = "ragbox")]
#[command(about = "Chat with a folder of documents using retrieval-augmented generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index documents in a folder
    Index {
        /// Path to the directory containing documents to index
        folder: PathBuf,
        /// Embedding provider (default: from config or 'ollama')
        #[arg(short, long)]
        embedding: Option<String>,
        /// Force rebuild the index
        #[arg(short, long)]
        rebuild: bool,
    },
    /// Ask a single question about the indexed documents
    Query {
        /// Path to the indexed directory
        folder: PathBuf,
        /// Your question about the documents
        question: String,
        /// LLM provider (default: from config or 'anthropic')
        #[arg(short, long)]
        llm: Option<String>,
        /// Embedding provider (default: from config or 'ollama')
        #[arg(short, long)]
        embedding: Option<String>,
        /// Number of chunks to retrieve
        #[arg(short, long)]
        top_k: Option<usize>,
    },
    /// Start an interactive chat session with the indexed documents
    Chat {
        /// Path to the indexed directory
        folder: PathBuf,
        /// LLM provider (default: from config or 'anthropic')
        #[arg(short, long)]
        llm: Option<String>,
        /// Embedding provider (default: from config or 'ollama')
        #[arg(short, long)]
        embedding: Option<String>,
    },
    /// Show the index status for a folder
    Status {
        /// Path to the directory
        folder: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {e}", console::style("Error:").red().bold());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;

    match cli.command {
        Commands::Index {
            folder,
            embedding,
            rebuild,
        } => {
            index_folder(&folder, embedding.as_deref(), rebuild, &config).await?;
        }
        Commands::Query {
            folder,
            question,
            llm,
            embedding,
            top_k,
        } => {
            query_folder(
                &folder,
                &question,
                llm.as_deref(),
                embedding.as_deref(),
                top_k,
                &config,
            )
            .await?;
        }
        Commands::Chat {
            folder,
            llm,
            embedding,
        } => {
            chat_folder(&folder, llm.as_deref(), embedding.as_deref(), &config).await?;
        }
        Commands::Status { folder } => {
            show_status(&folder, &config).await?;
        }
    }

    Ok(())
}
