
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimension: u32,
    pub api_key: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-embedding-001".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PineconeConfig {
    pub api_key: String,
    /// Data-plane host of the index holding repository content.
    pub code_index_host: String,
    /// Data-plane host of the index holding document pages.
    pub docs_index_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub code_lookback_hours: u64,
    pub docs_lookback_hours: u64,
    pub max_concurrent_tenants: usize,
    /// Base URL of the GitHub REST API.
    pub github_api_base: String,
    /// Base URL of the Notion API.
    pub notion_api_base: String,
    pub excluded_dirs: Vec<String>,
    pub supported_extensions: Vec<String>,
    /// Path to the tenant directory file, relative to the config dir unless absolute.
    pub tenants_path: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            code_lookback_hours: 24,
            docs_lookback_hours: 1,
            max_concurrent_tenants: 4,
            github_api_base: "https://api.github.com".to_string(),
            notion_api_base: "https://api.notion.com".to_string(),
            excluded_dirs: [
                ".git",
                "node_modules",
                "dist",
                "build",
                "target",
                "vendor",
                ".next",
                "__pycache__",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            supported_extensions: [
                ".rs", ".ts", ".tsx", ".js", ".jsx", ".py", ".go", ".java", ".kt", ".rb", ".c",
                ".cc", ".cpp", ".h", ".cs", ".swift", ".md", ".txt", ".toml", ".yaml", ".yml",
                ".json", ".sql", ".sh",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            tenants_path: PathBuf::from("tenants.toml"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DedupConfig {
    pub ttl_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { ttl_seconds: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Static key authorizing manual full-resync triggers.
    pub api_key: String,
    /// Scheduler-bound secret compared against a bearer authorization value.
    pub cron_secret: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid chunk size: {0} (must be between 100 and 8192)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid lookback hours: {0} (must be between 1 and 720)")]
    InvalidLookbackHours(u64),
    #[error("Invalid tenant concurrency: {0} (must be between 1 and 32)")]
    InvalidTenantConcurrency(usize),
    #[error("Invalid dedup TTL: {0} (must be between 1 and 86400 seconds)")]
    InvalidDedupTtl(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Get the default configuration directory path.
#[inline]
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("ragsync"))
        .context("Could not determine user configuration directory")
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.pinecone.validate()?;
        self.sync.validate()?;

        if self.dedup.ttl_seconds == 0 || self.dedup.ttl_seconds > 86400 {
            return Err(ConfigError::InvalidDedupTtl(self.dedup.ttl_seconds));
        }

        Ok(())
    }

    /// Resolve the tenant directory file relative to the config dir.
    #[inline]
    pub fn tenants_file_path(&self) -> PathBuf {
        if self.sync.tenants_path.is_absolute() {
            self.sync.tenants_path.clone()
        } else {
            self.base_dir.join(&self.sync.tenants_path)
        }
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        Ok(())
    }
}

impl PineconeConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        for host in [&self.code_index_host, &self.docs_index_host] {
            if !host.is_empty() {
                Url::parse(host).map_err(|_| ConfigError::InvalidUrl(host.clone()))?;
            }
        }
        Ok(())
    }
}

impl SyncConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(100..=8192).contains(&self.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.chunk_overlap,
                self.chunk_size,
            ));
        }

        for hours in [self.code_lookback_hours, self.docs_lookback_hours] {
            if !(1..=720).contains(&hours) {
                return Err(ConfigError::InvalidLookbackHours(hours));
            }
        }

        if !(1..=32).contains(&self.max_concurrent_tenants) {
            return Err(ConfigError::InvalidTenantConcurrency(
                self.max_concurrent_tenants,
            ));
        }

        for base in [&self.github_api_base, &self.notion_api_base] {
            Url::parse(base).map_err(|_| ConfigError::InvalidUrl(base.clone()))?;
        }

        Ok(())
    }
}
