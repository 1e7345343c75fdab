// Indexer module
// Walks a repository and turns every eligible file into stored embeddings

pub mod files;


use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::{StoredRecord, VectorStore};
use crate::embeddings::{EmbeddingProvider, TextChunker, create_provider};
use crate::{RagError, Result};

pub use files::{
    Discovery, FileContent, FileFilter, FileProcessor, extract_metadata, relative_path,
};

/// Outcome of one indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub files_discovered: usize,
    pub files_indexed: usize,
    /// (relative path, reason)
    pub skipped: Vec<(String, String)>,
    /// (relative path, error)
    pub failures: Vec<(String, String)>,
    pub chunks_created: usize,
    /// Records in the store once the run finished
    pub total_records: usize,
}

impl IndexReport {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Discover, read, chunk, embed and store
pub struct Indexer {
    repo_root: PathBuf,
    provider: Arc<dyn EmbeddingProvider>,
    store: VectorStore,
    chunker: TextChunker,
    filter: FileFilter,
    processor: FileProcessor,
    batch_size: usize,
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("repo_root", &self.repo_root)
            .field("provider", &self.provider.name())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Indexer {
    /// Build the provider and store named by `config`
    #[inline]
    pub async fn new(config: &Config, repo_root: impl Into<PathBuf>) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;
        let store = VectorStore::from_config(config).await?;
        Self::with_parts(config, repo_root, provider, store)
    }

    /// Assemble an indexer from an existing provider and store
    #[inline]
    pub fn with_parts(
        config: &Config,
        repo_root: impl Into<PathBuf>,
        provider: Arc<dyn EmbeddingProvider>,
        store: VectorStore,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            repo_root: repo_root.into(),
            provider,
            store,
            chunker: TextChunker::new(&config.indexing.chunking)?,
            filter: FileFilter::new(&config.indexing)?,
            processor: FileProcessor::new(config.indexing.max_file_size_mb),
            batch_size: config.performance.batch_size,
        })
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    #[inline]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Index every eligible file of the repository.
    ///
    /// With `force` the table is recreated first. One file failing does not
    /// stop the run unless the error is fatal.
    #[inline]
    pub async fn index_repository(&mut self, force: bool) -> Result<IndexReport> {
        info!("Indexing repository at {}", self.repo_root.display());
        self.prepare_store(force).await?;

        let Discovery { files, unwalkable } = self.filter.discover(&self.repo_root)?;
        let mut report = IndexReport {
            files_discovered: files.len(),
            failures: unwalkable,
            ..IndexReport::default()
        };

        let bar = progress_bar(files.len())?;

        for path in &files {
            let relative = relative_path(&self.repo_root, path);
            bar.set_message(relative.clone());

            match self.index_file(path, &relative).await {
                Ok(chunks) => {
                    report.files_indexed += 1;
                    report.chunks_created += chunks;
                }
                Err(e) if e.is_skip() => {
                    warn!("Skipping {}: {}", relative, e);
                    report.skipped.push((relative, e.to_string()));
                }
                Err(e) if e.is_fatal() => {
                    bar.abandon();
                    error!("Aborting indexing at {}: {}", relative, e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Failed to index {}: {}", relative, e);
                    report.failures.push((relative, e.to_string()));
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        if report.files_indexed > 0 {
            self.store.optimize().await?;
        }
        report.total_records = self.store.count().await?;

        info!(
            "Indexed {}/{} files ({} chunks, {} skipped, {} failed)",
            report.files_indexed,
            report.files_discovered,
            report.chunks_created,
            report.skipped.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Replace the stored records of one file.
    ///
    /// A file that no longer exists, or is no longer eligible, is only removed.
    #[inline]
    pub async fn update_file(&mut self, path: &Path) -> Result<usize> {
        let (absolute, relative) = self.resolve_in_repo(path)?;
        self.prepare_store(false).await?;

        self.store.delete_by_source_path(&relative).await?;

        if !absolute.is_file() || !self.filter.is_eligible(&relative) {
            info!("Removed {} from the index", relative);
            return Ok(0);
        }

        let chunks = self.index_file(&absolute, &relative).await?;
        info!("Re-indexed {} ({} chunks)", relative, chunks);
        Ok(chunks)
    }

    /// Canonical absolute path of `path` and its key relative to the repository root.
    ///
    /// A deleted file resolves through its parent directory, or lexically
    /// when the parent is gone too.
    fn resolve_in_repo(&self, path: &Path) -> Result<(PathBuf, String)> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.repo_root.join(path)
        };
        let root = self
            .repo_root
            .canonicalize()
            .unwrap_or_else(|_| normalize_lexically(&self.repo_root));

        let resolved = absolute.canonicalize().unwrap_or_else(|_| {
            match (absolute.parent().map(Path::canonicalize), absolute.file_name()) {
                (Some(Ok(parent)), Some(name)) => parent.join(name),
                _ => normalize_lexically(&absolute),
            }
        });

        let relative = resolved
            .strip_prefix(&root)
            .or_else(|_| resolved.strip_prefix(normalize_lexically(&self.repo_root)))
            .map_err(|_| {
                RagError::Configuration(format!(
                    "{} is outside the repository at {}",
                    path.display(),
                    root.display()
                ))
            })?;
        if relative.as_os_str().is_empty() {
            return Err(RagError::Configuration(format!(
                "{} is the repository root, not a file",
                path.display()
            )));
        }

        let relative = relative_path(Path::new(""), relative);
        Ok((resolved, relative))
    }

    /// Open the table, or create it when forced or missing
    async fn prepare_store(&mut self, force: bool) -> Result<()> {
        let dimension = self.provider.dimension();
        if force {
            return self.store.create_table(dimension).await;
        }

        match self.store.open_table().await {
            Ok(()) => {}
            Err(RagError::StoreNotFound(name)) => {
                debug!("Table {} missing, creating it", name);
                return self.store.create_table(dimension).await;
            }
            Err(e) => return Err(e),
        }

        match self.store.dimension() {
            Some(existing) if existing != dimension => Err(RagError::DimensionMismatch {
                expected: existing,
                actual: dimension,
            }),
            _ => Ok(()),
        }
    }

    async fn index_file(&self, path: &Path, relative: &str) -> Result<usize> {
        let FileContent { text, mut metadata } = self.processor.read(path)?;
        metadata.insert("indexed_at".to_string(), Utc::now().to_rfc3339().into());

        let chunks = self.chunker.chunk_by_structure(&text, relative, &metadata);
        if chunks.is_empty() {
            debug!("No chunks for {}", relative);
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self.provider.embed_batch(batch).await?;
            if embedded.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "Mismatch between request and response counts: {} vs {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            vectors.extend(embedded);
        }

        let records: Vec<StoredRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| StoredRecord::from_chunk(chunk, vector))
            .collect();
        self.store.add_records(&records).await?;

        debug!("Stored {} chunks for {}", records.len(), relative);
        Ok(records.len())
    }
}

/// Drop `.` components and fold `..` into their parent without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    if !console::user_attended_stderr() {
        return Ok(ProgressBar::hidden());
    }

    let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] Indexing {msg}")
        .map_err(|e| RagError::Other(e.into()))?;
    Ok(ProgressBar::new(len as u64).with_style(style))
}
