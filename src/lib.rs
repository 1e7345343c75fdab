use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Vector store not initialized. Call create_table() or open_table() first")]
    StoreUninitialized,

    #[error("Table '{0}' does not exist. Run `repo-rag index` to build the index first")]
    StoreNotFound(String),

    #[error("Vector dimension mismatch: table expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Cannot read {}: {reason}", path.display())]
    FileUnreadable {
        path: PathBuf,
        reason: UnreadableReason,
    },

    #[error("Invalid filter expression '{filter}': {message}")]
    FilterSyntax { filter: String, message: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Why a file was not turned into chunks
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnreadableReason {
    #[error("file is too large ({size_mb:.2} MB, limit {limit_mb} MB)")]
    TooLarge { size_mb: f64, limit_mb: u64 },
    #[error("file appears to be binary")]
    Binary,
    #[error("{0}")]
    Io(String),
}

impl RagError {
    /// Errors that make continuing a bulk indexing run pointless
    #[inline]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::StoreUninitialized | Self::DimensionMismatch { .. }
        )
    }

    /// Files that are deliberately passed over rather than failed
    #[inline]
    pub const fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::FileUnreadable {
                reason: UnreadableReason::TooLarge { .. } | UnreadableReason::Binary,
                ..
            }
        )
    }
}

pub mod api;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod indexer;
pub mod query;
