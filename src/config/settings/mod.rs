#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::embeddings::splitter::ChunkingConfig;
use crate::store::{IndexConfiguration, IndexFamily, sanitize_table_name};

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 3072;
pub const DEFAULT_TABLE_NAME: &str = "document_vectors";
pub const DEFAULT_CATEGORY: &str = "analytics_and_big_data";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub index: IndexConfiguration,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "pgvector_db".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

/// How chunks are spread over tables
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    #[default]
    Global,
    PerCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub partition: Partition,
    pub table: String,
    pub category: String,
    pub dimension: u32,
    pub insert_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Postgres,
            partition: Partition::Global,
            table: DEFAULT_TABLE_NAME.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            insert_batch_size: 100,
        }
    }
}

impl StoreConfig {
    /// Table holding the chunks for the configured partition
    #[inline]
    pub fn table_name(&self) -> String {
        match self.partition {
            Partition::Global => self.table.clone(),
            Partition::PerCategory => sanitize_table_name(&self.category),
        }
    }

    /// Table holding the chunks of a given category
    #[inline]
    pub fn table_for_category(&self, category: &str) -> String {
        match self.partition {
            Partition::Global => self.table.clone(),
            Partition::PerCategory => sanitize_table_name(category),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    #[default]
    OpenAi,
    Azure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub azure_deployment: String,
    pub azure_api_version: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::OpenAi,
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-large".to_string(),
            azure_deployment: String::new(),
            azure_api_version: "2024-02-01".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Docker Engine API used as the runtime metrics source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub docker_url: String,
    pub container_name: String,
    pub timeout_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            docker_url: "http://localhost:2375".to_string(),
            container_name: "pgvector_db".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    pub interval_ms: u64,
    pub before_ms: u64,
    pub during_ms: u64,
    pub after_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            before_ms: 1000,
            during_ms: 5000,
            after_ms: 1000,
        }
    }
}

impl SamplingConfig {
    #[inline]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[inline]
    pub fn before(&self) -> Duration {
        Duration::from_millis(self.before_ms)
    }

    #[inline]
    pub fn during(&self) -> Duration {
        Duration::from_millis(self.during_ms)
    }

    #[inline]
    pub fn after(&self) -> Duration {
        Duration::from_millis(self.after_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origin: String,
    pub default_top_n: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            allowed_origin: "http://localhost:8000".to_string(),
            default_top_n: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving measurement files
    pub results_dir: PathBuf,
    /// Directory holding per-category chunk CSV files
    pub chunk_dir: PathBuf,
    /// Directory holding generated search query files
    pub search_dir: PathBuf,
    pub auto_search_top_n: i64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("data/csv/search_results"),
            chunk_dir: PathBuf::from("data/csv"),
            search_dir: PathBuf::from("data/csv/search"),
            auto_search_top_n: 100,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid index type: {0} (must be one of none, ivfflat, hnsw)")]
    InvalidIndexType(String),
    #[error("Invalid hnsw m: {0} (must be between 2 and 100)")]
    InvalidHnswM(u32),
    #[error("Invalid hnsw ef_construction: {0} (must be at least 2 * m = {1})")]
    InvalidHnswEfConstruction(u32, u32),
    #[error("Invalid hnsw ef_search: {0} (must be between 1 and 1000)")]
    InvalidHnswEfSearch(u32),
    #[error("Invalid ivfflat lists: {0} (must be between 1 and 32768)")]
    InvalidIvfflatLists(u32),
    #[error("Invalid ivfflat probes: {0} (must be between 1 and lists = {1})")]
    InvalidIvfflatProbes(u32, u32),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 16000)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Azure deployment must be set when the azure provider is selected")]
    MissingAzureDeployment,
    #[error("Invalid sampling interval: {0}ms (must be greater than zero)")]
    InvalidSamplingInterval(u64),
    #[error("Invalid top_n: {0} (must be greater than zero)")]
    InvalidTopN(i64),
    #[error("Invalid insert batch size: {0} (must be between 1 and 10000)")]
    InvalidBatchSize(usize),
    #[error("Invalid chunk size: {0} (must be greater than zero)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    ChunkOverlapTooLarge(usize, usize),
    #[error("Invalid value for {name}: {value}")]
    InvalidEnvValue { name: String, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default directory holding `config.toml`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("pgvector-ann"))
            .or_else(|| dirs::home_dir().map(|home| home.join(".pgvector-ann")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `config_dir`, apply environment overrides and validate
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let mut config = Self::load_file(config_dir)?;

        config
            .apply_env_overrides(|name| std::env::var(name).ok())
            .context("Invalid environment override")?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load `config.toml` without consulting the environment
    #[inline]
    pub fn load_file<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
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

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Apply the deployment environment variables on top of file settings
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(name: &str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue {
                    name: name.to_string(),
                    value,
                })
        }

        if let Some(v) = lookup("PGVECTOR_DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = lookup("PGVECTOR_DB_PORT") {
            self.database.port = parsed("PGVECTOR_DB_PORT", v)?;
        }
        if let Some(v) = lookup("PGVECTOR_DB_NAME") {
            self.database.name = v;
        }
        if let Some(v) = lookup("PGVECTOR_DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = lookup("PGVECTOR_DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = lookup("INDEX_TYPE") {
            self.index.family = v.parse::<IndexFamily>()?;
        }
        if let Some(v) = lookup("HNSW_M") {
            self.index.hnsw_m = parsed("HNSW_M", v)?;
        }
        if let Some(v) = lookup("HNSW_EF_CONSTRUCTION") {
            self.index.hnsw_ef_construction = parsed("HNSW_EF_CONSTRUCTION", v)?;
        }
        if let Some(v) = lookup("HNSW_EF_SEARCH") {
            self.index.hnsw_ef_search = parsed("HNSW_EF_SEARCH", v)?;
        }
        if let Some(v) = lookup("IVFFLAT_LISTS") {
            self.index.ivfflat_lists = parsed("IVFFLAT_LISTS", v)?;
        }
        if let Some(v) = lookup("IVFFLAT_PROBES") {
            self.index.ivfflat_probes = parsed("IVFFLAT_PROBES", v)?;
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.embedding.api_key = v;
        }
        if let Some(v) = lookup("POSTGRES_CONTAINER_NAME") {
            self.metrics.container_name = v;
        }
        if let Some(v) = lookup("CSV_OUTPUT_DIR") {
            self.output.results_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CATEGORY_NAME") {
            self.store.category = v;
        }

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.port == 0 {
            return Err(ConfigError::InvalidPort(self.database.port));
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }

        self.index.validate()?;
        self.validate_store()?;
        self.validate_embedding()?;
        self.validate_metrics()?;

        if self.sampling.interval_ms == 0 {
            return Err(ConfigError::InvalidSamplingInterval(
                self.sampling.interval_ms,
            ));
        }

        if self.server.default_top_n <= 0 {
            return Err(ConfigError::InvalidTopN(self.server.default_top_n));
        }
        if self.output.auto_search_top_n <= 0 {
            return Err(ConfigError::InvalidTopN(self.output.auto_search_top_n));
        }

        self.validate_chunking()
    }

    fn validate_store(&self) -> Result<(), ConfigError> {
        let store = &self.store;

        if !(1..=16000).contains(&store.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(store.dimension));
        }

        if sanitize_table_name(&store.table) != store.table {
            return Err(ConfigError::InvalidTableName(store.table.clone()));
        }

        if store.insert_batch_size == 0 || store.insert_batch_size > 10_000 {
            return Err(ConfigError::InvalidBatchSize(store.insert_batch_size));
        }

        Ok(())
    }

    fn validate_embedding(&self) -> Result<(), ConfigError> {
        let embedding = &self.embedding;

        Url::parse(&embedding.base_url)
            .map_err(|_| ConfigError::InvalidUrl(embedding.base_url.clone()))?;

        if embedding.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(embedding.model.clone()));
        }

        if embedding.provider == EmbeddingProviderKind::Azure
            && embedding.azure_deployment.trim().is_empty()
        {
            return Err(ConfigError::MissingAzureDeployment);
        }

        Ok(())
    }

    fn validate_metrics(&self) -> Result<(), ConfigError> {
        Url::parse(&self.metrics.docker_url)
            .map_err(|_| ConfigError::InvalidUrl(self.metrics.docker_url.clone()))?;
        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;

        if chunking.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(chunking.chunk_size));
        }

        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(ConfigError::ChunkOverlapTooLarge(
                chunking.chunk_overlap,
                chunking.chunk_size,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn embedding_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.embedding.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.embedding.base_url.clone()))
    }

    #[inline]
    pub fn docker_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.metrics.docker_url)
            .map_err(|_| ConfigError::InvalidUrl(self.metrics.docker_url.clone()))
    }
}
