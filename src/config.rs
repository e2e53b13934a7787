use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub source: SourceConfig,
    pub download: DownloadConfig,
    pub ingest: IngestSection,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Persistence is opt-in: `None` means results are only returned, never stored.
    pub db_path: Option<String>,
    pub output_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DownloadConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestSection {
    pub max_results: usize,
    pub max_concurrency: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"remote"` or `"local"`.
    pub backend: String,
    /// Model name; each backend has its own default when unset.
    pub model: Option<String>,
    pub cache_dir: String,
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub max_input_chars: usize,
    pub batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            storage: StorageConfig::default(),
            source: SourceConfig::default(),
            download: DownloadConfig::default(),
            ingest: IngestSection::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            output_dir: "downloads".into(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: "https://export.arxiv.org/api/query".into(),
            timeout_secs: 30,
            user_agent: format!("arxiv-ingest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            timeout_secs: 60,
        }
    }
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            max_results: 5,
            max_concurrency: 4,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_app_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            backend: "remote".into(),
            model: None,
            cache_dir,
            api_key: None,
            api_base_url: "https://api.openai.com/v1".into(),
            max_input_chars: 24_000,
            batch_size: None,
            batch_delay_ms: None,
        }
    }
}

impl DownloadConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Returns `~/.arxiv-ingest/`
pub fn default_app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".arxiv-ingest")
}

/// Returns the default config file path: `~/.arxiv-ingest/config.toml`
pub fn default_config_path() -> PathBuf {
    default_app_dir().join("config.toml")
}

impl IngestConfig {
    /// Load config from the default TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            IngestConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (ARXIV_INGEST_DB, ARXIV_INGEST_OUTPUT, ARXIV_INGEST_LOG_LEVEL, OPENAI_API_KEY).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ARXIV_INGEST_DB") {
            self.storage.db_path = Some(val);
        }
        if let Ok(val) = std::env::var("ARXIV_INGEST_OUTPUT") {
            self.storage.output_dir = val;
        }
        if let Ok(val) = std::env::var("ARXIV_INGEST_LOG_LEVEL") {
            self.log.level = val;
        }
        if self.embedding.api_key.is_none() {
            if let Ok(val) = std::env::var("OPENAI_API_KEY") {
                if !val.trim().is_empty() {
                    self.embedding.api_key = Some(val);
                }
            }
        }
    }

    /// Configured database path with `~` expanded, if persistence is enabled.
    pub fn resolved_db_path(&self) -> Option<PathBuf> {
        self.storage.db_path.as_deref().map(expand_tilde)
    }

    pub fn resolved_output_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.output_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = IngestConfig::default();
        assert_eq!(config.log.level, "info");
        assert!(config.storage.db_path.is_none(), "persistence must be opt-in");
        assert_eq!(config.storage.output_dir, "downloads");
        assert_eq!(config.download.max_attempts, 3);
        assert_eq!(config.ingest.max_results, 5);
        assert_eq!(config.embedding.backend, "remote");
        assert!(config.embedding.cache_dir.ends_with("models"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[log]
level = "debug"

[storage]
db_path = "/tmp/papers.db"

[download]
max_attempts = 5

[embedding]
backend = "local"
model = "all-MiniLM-L6-v2"
"#;
        let config: IngestConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.storage.db_path.as_deref(), Some("/tmp/papers.db"));
        assert_eq!(config.download.max_attempts, 5);
        assert_eq!(config.embedding.backend, "local");
        assert_eq!(config.embedding.model.as_deref(), Some("all-MiniLM-L6-v2"));
        // defaults still apply for unset fields
        assert_eq!(config.download.max_delay_ms, 10_000);
        assert_eq!(config.storage.output_dir, "downloads");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = IngestConfig::default();
        std::env::set_var("ARXIV_INGEST_DB", "/tmp/override.db");
        std::env::set_var("ARXIV_INGEST_OUTPUT", "/tmp/pdfs");
        std::env::set_var("ARXIV_INGEST_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path.as_deref(), Some("/tmp/override.db"));
        assert_eq!(config.storage.output_dir, "/tmp/pdfs");
        assert_eq!(config.log.level, "trace");

        std::env::remove_var("ARXIV_INGEST_DB");
        std::env::remove_var("ARXIV_INGEST_OUTPUT");
        std::env::remove_var("ARXIV_INGEST_LOG_LEVEL");
    }

    #[test]
    fn explicit_api_key_wins_over_env() {
        let mut config = IngestConfig::default();
        config.embedding.api_key = Some("from-file".into());
        config.apply_env_overrides();
        assert_eq!(config.embedding.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("/var/data/x.db"), PathBuf::from("/var/data/x.db"));
        assert_eq!(expand_tilde("relative/x.db"), PathBuf::from("relative/x.db"));
    }
}
