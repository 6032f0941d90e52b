use anyhow::Result;
use clap::{Parser, Subcommand};
use pgvector_ann::commands::{
    IngestInput, SearchTarget, aggregate, auto_search, drop_tables, generate_queries, ingest,
    search, serve, setup, show_status, write_config,
};
use pgvector_ann::config::{Config, resolve_config_dir, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pgvector-ann")]
#[command(about = "Benchmark pgvector HNSW and IVFFlat indexes under measured search load")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or save the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Start the WebSocket query server
    Serve {
        /// Suffix measurement files with this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Create the vector extension, table and configured index
    Setup,
    /// Load chunk CSV files, or split and embed documents, into the store
    Ingest {
        /// Load the combined files under the "all" directory instead of category directories
        #[arg(long, conflicts_with = "documents")]
        all: bool,
        /// Plain text documents to split and embed
        #[arg(long, num_args = 1..)]
        documents: Vec<PathBuf>,
        /// Category of the documents
        #[arg(long)]
        category: Option<String>,
        /// Also write the embedded chunks as CSV under the chunk directory
        #[arg(long, requires = "documents")]
        export: bool,
    },
    /// Run one measured search
    Search {
        question: String,
        /// Number of results to return
        #[arg(long)]
        top_n: Option<i64>,
        /// File name of the expected chunk
        #[arg(long, requires = "page")]
        file: Option<String>,
        /// Page of the expected chunk
        #[arg(long, requires = "file")]
        page: Option<i32>,
        /// Append the measurements to the result files
        #[arg(long)]
        record: bool,
    },
    /// Run every generated query of a category
    AutoSearch {
        /// Category to search, defaults to the configured one
        #[arg(long)]
        category: Option<String>,
    },
    /// Sample benchmark queries from a category's chunk files
    GenerateQueries {
        #[arg(long)]
        category: Option<String>,
        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Average measurement files per index configuration
    Aggregate {
        /// Measurement files, defaults to the window files in the results directory
        files: Vec<PathBuf>,
        /// Category suffix of the default window files
        #[arg(long)]
        category: Option<String>,
    },
    /// Show tables, row counts and indexes
    Status,
    /// Drop every table in the store
    DropTables {
        /// Confirm the drop
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&config_dir)?);
            } else {
                write_config(&Config::load_file(&config_dir)?)?;
            }
        }
        Commands::Serve { category } => {
            serve(&Config::load(&config_dir)?, category).await?;
        }
        Commands::Setup => {
            setup(&Config::load(&config_dir)?).await?;
        }
        Commands::Ingest {
            all,
            documents,
            category,
            export,
        } => {
            let input = if documents.is_empty() {
                IngestInput::ChunkFiles { all }
            } else {
                IngestInput::Documents {
                    files: documents,
                    export,
                }
            };
            ingest(&Config::load(&config_dir)?, input, category).await?;
        }
        Commands::Search {
            question,
            top_n,
            file,
            page,
            record,
        } => {
            let target = file
                .zip(page)
                .map(|(file_name, page)| SearchTarget { file_name, page });
            search(&Config::load(&config_dir)?, question, top_n, target, record).await?;
        }
        Commands::AutoSearch { category } => {
            auto_search(&Config::load(&config_dir)?, category).await?;
        }
        Commands::GenerateQueries { category, seed } => {
            generate_queries(&Config::load(&config_dir)?, category, seed)?;
        }
        Commands::Aggregate { files, category } => {
            aggregate(&Config::load(&config_dir)?, files, category.as_deref())?;
        }
        Commands::Status => {
            show_status(&Config::load(&config_dir)?).await?;
        }
        Commands::DropTables { yes } => {
            drop_tables(&Config::load(&config_dir)?, yes).await?;
        }
    }

    Ok(())
}
