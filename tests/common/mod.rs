// Shared fixtures for the integration tests
#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use repo_rag::Result;
use repo_rag::config::Config;
use repo_rag::embeddings::EmbeddingProvider;
use tempfile::TempDir;

pub const VOCABULARY: &[&str] = &[
    "swift", "python", "rust", "install", "database", "vector", "query", "config",
];

/// Deterministic embeddings: one axis per vocabulary word, counted in the text
#[derive(Debug, Default)]
pub struct KeywordProvider;

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len()
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    VOCABULARY
        .iter()
        .map(|word| lower.matches(word).count() as f32 + 0.01)
        .collect()
}

/// Route `tracing` output through the test harness; repeated calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config whose vector store lives inside `config_dir`
pub fn config_in(config_dir: &Path) -> Config {
    Config {
        base_dir: config_dir.to_path_buf(),
        ..Config::default()
    }
}

pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("should create parent dirs");
    }
    fs::write(path, content).expect("should write file");
}

/// A small repository with code, docs and files that must be ignored
pub fn sample_repository() -> TempDir {
    let repo = TempDir::new().expect("should create repo dir");
    let root = repo.path();

    write_file(
        root,
        "README.md",
        "# Sample\nA vector database demo.\n\n## Install\nRun the install script to install it.\n\n## Query\nAsk a query against the vector database.\n",
    );
    write_file(
        root,
        "src/store.rs",
        "pub struct Database {\n    vectors: Vec<Vec<f32>>,\n}\n\nimpl Database {\n    pub fn query(&self, vector: &[f32]) -> usize {\n        self.vectors.len() + vector.len()\n    }\n}\n",
    );
    write_file(
        root,
        "scripts/setup.py",
        "def install():\n    \"\"\"Install python dependencies.\"\"\"\n    print('python install done')\n",
    );
    write_file(root, "config/app.toml", "[config]\nname = \"config demo\"\n");
    write_file(root, "node_modules/pkg/index.js", "module.exports = 'rust';\n");
    write_file(root, "target/debug/out.rs", "fn rust() {}\n");
    write_file(root, ".git/HEAD.txt", "ref: refs/heads/main\n");
    fs::write(root.join("logo.png"), [0x89, b'P', b'N', b'G', 0]).expect("should write png");
    repo
}
