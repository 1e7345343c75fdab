// Configuration management module
// TOML settings with environment overrides

pub mod settings;

pub use settings::{
    CONFIG_FILE_NAME, Config, ConfigError, DEFAULT_CONFIG_DIR, DatabaseConfig, DistanceMetric,
    EmbeddingConfig, IndexingConfig, LocalModelConfig, PerformanceConfig, RemoteModelConfig,
    RetrievalConfig,
};

/// Configuration directory for a repository when none is given explicitly
#[inline]
pub fn default_config_dir(repo_root: &std::path::Path) -> std::path::PathBuf {
    repo_root.join(DEFAULT_CONFIG_DIR)
}
