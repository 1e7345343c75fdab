
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::RagError;
use crate::embeddings::chunking::ChunkingConfig;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_CONFIG_DIR: &str = ".rag";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub database: DatabaseConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub performance: PerformanceConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// One of `openai`, `cohere` or `local`
    pub provider: String,
    pub openai: RemoteModelConfig,
    pub cohere: RemoteModelConfig,
    pub local: LocalModelConfig,
    pub retry_attempts: u32,
    pub timeout_seconds: u64,
    #[serde(skip)]
    pub openai_api_key: Option<String>,
    #[serde(skip)]
    pub cohere_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteModelConfig {
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalModelConfig {
    pub model: String,
    /// Where downloaded model files are kept; defaults to the user cache dir
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Relative paths resolve against the config directory
    pub path: PathBuf,
    pub table_name: String,
    pub distance_metric: DistanceMetric,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    Dot,
}

impl std::fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Dot => "dot",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexingConfig {
    #[serde(flatten)]
    pub chunking: ChunkingConfig,
    pub max_file_size_mb: u64,
    pub supported_extensions: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Minimum similarity in `[0, 1]`; 0 disables filtering
    pub similarity_threshold: f32,
    pub context_max_tokens: usize,
    pub context_top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Texts sent to the embedding provider per call
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            openai: RemoteModelConfig {
                model: "text-embedding-3-small".to_string(),
                base_url: "https://api.openai.com".to_string(),
            },
            cohere: RemoteModelConfig {
                model: "embed-english-v3.0".to_string(),
                base_url: "https://api.cohere.ai".to_string(),
            },
            local: LocalModelConfig::default(),
            retry_attempts: 3,
            timeout_seconds: 30,
            openai_api_key: None,
            cohere_api_key: None,
        }
    }
}

impl Default for LocalModelConfig {
    #[inline]
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for DatabaseConfig {
    #[inline]
    fn default() -> Self {
        Self {
            path: PathBuf::from("vectors"),
            table_name: "repository_embeddings".to_string(),
            distance_metric: DistanceMetric::Cosine,
        }
    }
}

impl Default for IndexingConfig {
    #[inline]
    fn default() -> Self {
        let extensions = [
            "swift", "py", "js", "jsx", "ts", "tsx", "rs", "go", "java", "c", "cpp", "h", "hpp",
            "md", "markdown", "txt", "json", "toml", "yaml", "yml", "sh",
        ];
        let excludes = [
            "node_modules/*",
            "target/*",
            "build/*",
            "dist/*",
            "vendor/*",
            "*.lock",
            "*.min.js",
            "package-lock.json",
        ];
        Self {
            chunking: ChunkingConfig::default(),
            max_file_size_mb: 5,
            supported_extensions: extensions.iter().map(|e| (*e).to_string()).collect(),
            exclude_patterns: excludes.iter().map(|e| (*e).to_string()).collect(),
        }
    }
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.7,
            context_max_tokens: 4000,
            context_top_k: 10,
        }
    }
}

impl Default for PerformanceConfig {
    #[inline]
    fn default() -> Self {
        Self { batch_size: 32 }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown embedding provider: {0} (must be 'openai', 'cohere' or 'local')")]
    InvalidProvider(String),
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name for {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid table name: {0:?} (must be non-empty alphanumeric or underscore)")]
    InvalidTableName(String),
    #[error("Invalid chunk size: {0} (must be between 1 and 100000)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid max file size: {0} MB (must be between 1 and 1024)")]
    InvalidMaxFileSize(u64),
    #[error("Invalid exclude pattern {0:?}: {1}")]
    InvalidExcludePattern(String, String),
    #[error("Invalid top_k: {0} (must be between 1 and 1000)")]
    InvalidTopK(usize),
    #[error("Invalid similarity threshold: {0} (must be between 0.0 and 1.0)")]
    InvalidThreshold(f32),
    #[error("Invalid context token budget: {0} (must be greater than zero)")]
    InvalidContextBudget(usize),
    #[error("Invalid batch size: {0} (must be between 1 and 2048)")]
    InvalidBatchSize(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl From<ConfigError> for RagError {
    #[inline]
    fn from(error: ConfigError) -> Self {
        Self::Configuration(error.to_string())
    }
}

impl Config {
    /// Load `config.toml` from `config_dir`, then apply environment overrides.
    ///
    /// A missing file yields the defaults.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        Self::load_with_env(config_dir, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an injectable environment lookup
    #[inline]
    pub fn load_with_env<P, F>(config_dir: P, env: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_dir = config_dir.as_ref();
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str::<Self>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::default()
        };
        config.base_dir = config_dir.to_path_buf();
        config.apply_env_overrides(env);

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Override selected settings and pick up API keys from the environment
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        if let Some(provider) = non_empty("EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Some(model) = non_empty("OPENAI_EMBEDDING_MODEL") {
            self.embedding.openai.model = model;
        }
        if let Some(model) = non_empty("COHERE_EMBEDDING_MODEL") {
            self.embedding.cohere.model = model;
        }
        if let Some(model) = non_empty("LOCAL_EMBEDDING_MODEL") {
            self.embedding.local.model = model;
        }
        if let Some(path) = non_empty("VECTOR_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }

        self.embedding.openai_api_key = non_empty("OPENAI_API_KEY");
        self.embedding.cohere_api_key = non_empty("COHERE_API_KEY");
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Vector database directory, resolved against the config directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else {
            self.get_base_dir().join(&self.database.path)
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.database.validate()?;
        self.indexing.validate()?;
        self.retrieval.validate()?;
        self.performance.validate()?;
        Ok(())
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.provider.as_str() {
            "openai" | "cohere" | "local" => {}
            other => return Err(ConfigError::InvalidProvider(other.to_string())),
        }

        for (name, remote) in [("openai", &self.openai), ("cohere", &self.cohere)] {
            if remote.model.trim().is_empty() {
                return Err(ConfigError::InvalidModel(name.to_string()));
            }
            Url::parse(&remote.base_url)
                .map_err(|_| ConfigError::InvalidUrl(remote.base_url.clone()))?;
        }

        if self.local.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel("local".to_string()));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    /// Model name of the currently selected provider
    #[inline]
    pub fn active_model(&self) -> &str {
        match self.provider.as_str() {
            "cohere" => &self.cohere.model,
            "local" => &self.local.model,
            _ => &self.openai.model,
        }
    }
}

impl DatabaseConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_name = !self.table_name.is_empty()
            && self
                .table_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(ConfigError::InvalidTableName(self.table_name.clone()));
        }
        Ok(())
    }
}

impl IndexingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;
        if !(1..=100_000).contains(&chunking.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(chunking.chunk_size));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                chunking.chunk_overlap,
                chunking.chunk_size,
            ));
        }

        if !(1..=1024).contains(&self.max_file_size_mb) {
            return Err(ConfigError::InvalidMaxFileSize(self.max_file_size_mb));
        }

        for pattern in &self.exclude_patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                ConfigError::InvalidExcludePattern(pattern.clone(), e.msg.to_string())
            })?;
        }

        Ok(())
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }
        if !(1..=1000).contains(&self.context_top_k) {
            return Err(ConfigError::InvalidTopK(self.context_top_k));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::InvalidThreshold(self.similarity_threshold));
        }
        if self.context_max_tokens == 0 {
            return Err(ConfigError::InvalidContextBudget(self.context_max_tokens));
        }
        Ok(())
    }
}

impl PerformanceConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=2048).contains(&self.batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        Ok(())
    }
}
