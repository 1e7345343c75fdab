use anyhow::{Context, Result};
use console::style;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::api::RagApi;
use crate::config::{Config, default_config_dir};
use crate::indexer::{IndexReport, Indexer};
use crate::query::{OutputFormat, format_results};

/// Failures listed by name in a run summary; the rest are only counted
const MAX_LISTED_FAILURES: usize = 10;

/// `--config-dir` if given, otherwise `.rag` inside the repository
#[inline]
pub fn resolve_config_dir(config_dir: Option<&Path>, repo_root: &Path) -> PathBuf {
    config_dir.map_or_else(|| default_config_dir(repo_root), Path::to_path_buf)
}

fn load_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir)
        .with_context(|| format!("Failed to load configuration from {}", config_dir.display()))
}

/// Index (or with `force`, rebuild the index of) a repository
#[inline]
pub async fn index_repository(
    config_dir: Option<&Path>,
    repo_root: &Path,
    force: bool,
) -> Result<IndexReport> {
    let repo_root = repo_root
        .canonicalize()
        .with_context(|| format!("Repository not found: {}", repo_root.display()))?;
    let config = load_config(&resolve_config_dir(config_dir, &repo_root))?;

    info!(
        "Indexing {} with {} embeddings",
        repo_root.display(),
        config.embedding.provider
    );
    let mut indexer = Indexer::new(&config, &repo_root).await?;
    let report = indexer.index_repository(force).await?;

    eprint!("{}", render_summary(&report));
    Ok(report)
}

/// Re-index a single file after it changed or was removed
#[inline]
pub async fn update_file(config_dir: Option<&Path>, repo_root: &Path, file: &Path) -> Result<()> {
    let repo_root = repo_root
        .canonicalize()
        .with_context(|| format!("Repository not found: {}", repo_root.display()))?;
    let config = load_config(&resolve_config_dir(config_dir, &repo_root))?;
    let mut indexer = Indexer::new(&config, &repo_root).await?;

    // Relative paths are taken from the working directory, like any shell argument
    let absolute = if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(file)
    };
    let chunks = indexer.update_file(&absolute).await?;
    if chunks == 0 {
        eprintln!(
            "{} {}",
            style("Removed from index:").yellow(),
            file.display()
        );
    } else {
        eprintln!(
            "{} {} ({} chunks)",
            style("Updated:").green(),
            file.display(),
            chunks
        );
    }
    Ok(())
}

/// Options of the `query` subcommand
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub threshold: Option<f32>,
    pub file_filter: Option<String>,
    pub format: OutputFormat,
    pub stats: bool,
}

#[inline]
pub async fn run_query(config_dir: Option<&Path>, text: &str, options: &QueryOptions) -> Result<()> {
    let api = open_api(config_dir).await?;

    if options.stats {
        print_stats(&api).await?;
    }

    let results = api
        .search(
            text,
            options.top_k,
            options.threshold,
            options.file_filter.as_deref(),
        )
        .await?;

    if results.is_empty() {
        eprintln!("{}", style("No results found.").yellow());
        return Ok(());
    }

    println!("{}", format_results(&results, options.format)?);
    Ok(())
}

#[inline]
pub async fn show_context(
    config_dir: Option<&Path>,
    text: &str,
    max_tokens: Option<usize>,
    top_k: Option<usize>,
) -> Result<()> {
    let api = open_api(config_dir).await?;
    println!("{}", api.get_context(text, max_tokens, top_k).await?);
    Ok(())
}

#[inline]
pub async fn answer_question(
    config_dir: Option<&Path>,
    question: &str,
    model: Option<&str>,
) -> Result<()> {
    let api = open_api(config_dir).await?;
    let answer = api
        .answer_with_context(question, model)
        .await
        .context("Error calling LLM")?;
    println!("{answer}");
    Ok(())
}

#[inline]
pub async fn show_stats(config_dir: Option<&Path>) -> Result<()> {
    let api = open_api(config_dir).await?;
    print_stats(&api).await
}

/// Print the configuration, or write it out so it can be edited
#[inline]
pub fn show_config(config_dir: Option<&Path>, show: bool) -> Result<()> {
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;
    let config = load_config(&resolve_config_dir(config_dir, &current_dir))?;

    if !show {
        config.save()?;
        eprintln!(
            "{} {}",
            style("Configuration written to").green(),
            style(config.config_file_path().display()).dim()
        );
        return Ok(());
    }

    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();
    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!("  Provider: {}", style(&config.embedding.provider).cyan());
    eprintln!("  Model: {}", style(config.embedding.active_model()).cyan());
    eprintln!(
        "  Retries: {} (timeout {}s)",
        style(config.embedding.retry_attempts).cyan(),
        config.embedding.timeout_seconds
    );
    eprintln!("{}", style("Database:").bold().yellow());
    eprintln!(
        "  Path: {}",
        style(config.vector_database_path().display()).cyan()
    );
    eprintln!("  Table: {}", style(&config.database.table_name).cyan());
    eprintln!("  Metric: {}", style(config.database.distance_metric).cyan());
    eprintln!("{}", style("Indexing:").bold().yellow());
    eprintln!(
        "  Chunk size: {} (overlap {})",
        style(config.indexing.chunking.chunk_size).cyan(),
        config.indexing.chunking.chunk_overlap
    );
    eprintln!(
        "  Max file size: {} MB",
        style(config.indexing.max_file_size_mb).cyan()
    );
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  Top k: {} (threshold {})",
        style(config.retrieval.top_k).cyan(),
        config.retrieval.similarity_threshold
    );
    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    Ok(())
}

async fn open_api(config_dir: Option<&Path>) -> Result<RagApi> {
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;
    let config = load_config(&resolve_config_dir(config_dir, &current_dir))?;
    Ok(RagApi::open(config).await?)
}

async fn print_stats(api: &RagApi) -> Result<()> {
    let stats = api.get_stats().await?;
    eprintln!("{}", style("Index Statistics").bold().cyan());
    eprintln!("  Total chunks: {}", style(stats.total_records).cyan());
    eprintln!("  Indexed files: {}", style(stats.indexed_files).cyan());
    eprintln!(
        "  Embedding: {} ({} dimensions)",
        style(&stats.embedding_provider).cyan(),
        stats.embedding_dimension
    );
    eprintln!();
    Ok(())
}

/// End-of-run summary for an indexing report
#[inline]
pub fn render_summary(report: &IndexReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{}", style("Indexing complete").bold().green());
    let _ = writeln!(
        output,
        "  Files indexed: {}/{}",
        report.files_indexed, report.files_discovered
    );
    let _ = writeln!(output, "  Chunks created: {}", report.chunks_created);
    let _ = writeln!(output, "  Total records: {}", report.total_records);

    if !report.skipped.is_empty() {
        let _ = writeln!(output, "  Skipped: {}", style(report.skipped.len()).yellow());
    }

    if !report.failures.is_empty() {
        let _ = writeln!(
            output,
            "{}",
            style(format!("Failed files ({}):", report.failures.len())).red()
        );
        for (path, error) in report.failures.iter().take(MAX_LISTED_FAILURES) {
            let _ = writeln!(output, "  - {path}: {error}");
        }
        if report.failures.len() > MAX_LISTED_FAILURES {
            let _ = writeln!(
                output,
                "  ... and {} more",
                report.failures.len() - MAX_LISTED_FAILURES
            );
        }
    }
    output
}
