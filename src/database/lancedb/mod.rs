// LanceDB vector database module
// Handles vector storage and similarity search for chunk embeddings

#[cfg(test)]
mod tests;

pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::embeddings::chunking::{Metadata, TextChunk};

pub use vector_store::VectorStore;

/// Embedded chunk as persisted in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// `"{source_path}_{chunk_index}"`
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    /// Path relative to the repository root
    pub source_path: String,
    pub chunk_index: u32,
    /// Stored as a JSON string column
    pub metadata: Metadata,
}

impl StoredRecord {
    #[inline]
    pub fn record_id(source_path: &str, chunk_index: u32) -> String {
        format!("{source_path}_{chunk_index}")
    }

    /// Pair a chunk with its embedding
    #[inline]
    pub fn from_chunk(chunk: TextChunk, vector: Vec<f32>) -> Self {
        Self {
            id: Self::record_id(&chunk.source_path, chunk.chunk_index),
            text: chunk.text,
            vector,
            source_path: chunk.source_path,
            chunk_index: chunk.chunk_index,
            metadata: chunk.metadata,
        }
    }
}

/// One nearest-neighbour hit, without its vector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub source_path: String,
    pub chunk_index: u32,
    pub metadata: Metadata,
    /// Smaller is more similar
    pub distance: f32,
}

impl SearchResult {
    /// `1 - distance`; only meaningful for the cosine metric
    #[inline]
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}
