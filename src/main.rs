use std::path::PathBuf;

use clap::{Parser, Subcommand};
use repo_rag::Result;
use repo_rag::commands::{
    QueryOptions, answer_question, index_repository, run_query, show_config, show_context,
    show_stats, update_file,
};
use repo_rag::query::OutputFormat;

#[derive(Parser)]
#[command(name = "repo-rag")]
#[command(about = "Index a code repository and retrieve relevant context for LLMs")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to .rag inside the repository)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every eligible file of a repository
    Index {
        /// Repository root
        #[arg(default_value = ".")]
        repo: PathBuf,
        /// Drop the existing index and rebuild it
        #[arg(long)]
        force: bool,
    },
    /// Re-index one file after it changed or was deleted
    Update {
        file: PathBuf,
        /// Repository root
        #[arg(long, default_value = ".")]
        repo: PathBuf,
    },
    /// Search the index
    Query {
        text: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Minimum similarity in [0, 1]; 0 disables filtering
        #[arg(long)]
        threshold: Option<f32>,
        /// Glob over source paths, e.g. "*.md"
        #[arg(long)]
        file_filter: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Print index statistics first
        #[arg(long)]
        stats: bool,
    },
    /// Build a context block for a language model
    Context {
        text: String,
        #[arg(long)]
        max_tokens: Option<usize>,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer a question from repository context (requires OPENAI_API_KEY)
    Answer {
        question: String,
        /// Chat model, gpt-4 by default
        #[arg(long)]
        model: Option<String>,
    },
    /// Show index statistics
    Stats,
    /// Write the configuration file, or show it
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = cli.config_dir.as_deref();

    match cli.command {
        Commands::Index { repo, force } => {
            let report = index_repository(config_dir, &repo, force).await?;
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Commands::Update { file, repo } => {
            update_file(config_dir, &repo, &file).await?;
        }
        Commands::Query {
            text,
            top_k,
            threshold,
            file_filter,
            format,
            stats,
        } => {
            let options = QueryOptions {
                top_k,
                threshold,
                file_filter,
                format,
                stats,
            };
            run_query(config_dir, &text, &options).await?;
        }
        Commands::Context {
            text,
            max_tokens,
            top_k,
        } => {
            show_context(config_dir, &text, max_tokens, top_k).await?;
        }
        Commands::Answer { question, model } => {
            answer_question(config_dir, &question, model.as_deref()).await?;
        }
        Commands::Stats => {
            show_stats(config_dir).await?;
        }
        Commands::Config { show } => {
            show_config(config_dir, show)?;
        }
    }

    Ok(())
}
