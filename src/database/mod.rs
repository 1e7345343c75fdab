// Database module
// LanceDB holds chunk text, vectors and per-file metadata

pub mod lancedb;

pub use self::lancedb::{SearchResult, StoredRecord, VectorStore};
