use super::*;
use std::collections::HashMap;
use tempfile::TempDir;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.database.host, "localhost");
    assert_eq!(config.database.port, 5432);
    assert_eq!(config.index.family, IndexFamily::None);
    assert_eq!(config.store.table, "document_vectors");
    assert_eq!(config.store.dimension, 3072);
    assert_eq!(config.embedding.model, "text-embedding-3-large");
    assert_eq!(config.sampling.interval_ms, 100);
    assert_eq!(config.server.port, 8001);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.database.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.sampling.interval_ms = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.server.default_top_n = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.store.table = "Document Vectors; DROP".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTableName(_))
    ));

    let mut invalid_config = config;
    invalid_config.chunking.chunk_overlap = invalid_config.chunking.chunk_size;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::ChunkOverlapTooLarge(_, _))
    ));
}

#[test]
fn azure_requires_deployment() {
    let mut config = Config::default();
    config.embedding.provider = EmbeddingProviderKind::Azure;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MissingAzureDeployment)
    ));

    config.embedding.azure_deployment = "embeddings-large".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn env_overrides_apply() {
    let mut config = Config::default();
    let lookup = env_from(&[
        ("PGVECTOR_DB_HOST", "db.internal"),
        ("PGVECTOR_DB_PORT", "6543"),
        ("INDEX_TYPE", "HNSW"),
        ("HNSW_M", "24"),
        ("HNSW_EF_CONSTRUCTION", "128"),
        ("HNSW_EF_SEARCH", "80"),
        ("CATEGORY_NAME", "security"),
        ("POSTGRES_CONTAINER_NAME", "bench_db"),
    ]);

    config
        .apply_env_overrides(lookup)
        .expect("overrides should apply");

    assert_eq!(config.database.host, "db.internal");
    assert_eq!(config.database.port, 6543);
    assert_eq!(config.index.family, IndexFamily::Hnsw);
    assert_eq!(config.index.hnsw_m, 24);
    assert_eq!(config.index.hnsw_ef_construction, 128);
    assert_eq!(config.index.hnsw_ef_search, 80);
    assert_eq!(config.store.category, "security");
    assert_eq!(config.metrics.container_name, "bench_db");
    assert!(config.validate().is_ok());
}

#[test]
fn env_override_rejects_unknown_index_type() {
    let mut config = Config::default();
    let result = config.apply_env_overrides(env_from(&[("INDEX_TYPE", "diskann")]));
    assert!(matches!(result, Err(ConfigError::InvalidIndexType(_))));
}

#[test]
fn env_override_rejects_non_numeric_port() {
    let mut config = Config::default();
    let result = config.apply_env_overrides(env_from(&[("PGVECTOR_DB_PORT", "five")]));
    assert!(matches!(result, Err(ConfigError::InvalidEnvValue { .. })));
}

#[test]
fn per_category_partition_uses_sanitized_table() {
    let mut store = StoreConfig {
        partition: Partition::PerCategory,
        category: "Analytics & Big-Data".to_string(),
        ..StoreConfig::default()
    };
    assert_eq!(store.table_name(), "analytics_big_data");
    assert_eq!(store.table_for_category("2024 reports"), "t_2024_reports");

    store.partition = Partition::Global;
    assert_eq!(store.table_name(), "document_vectors");
    assert_eq!(store.table_for_category("anything"), "document_vectors");
}

#[test]
fn sampling_durations() {
    let sampling = SamplingConfig::default();
    assert_eq!(sampling.interval(), Duration::from_millis(100));
    assert_eq!(sampling.before(), Duration::from_secs(1));
    assert_eq!(sampling.during(), Duration::from_secs(5));
    assert_eq!(sampling.after(), Duration::from_secs(1));
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn load_missing_config() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load_file(temp_dir.path()).expect("missing file falls back to defaults");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.database, DatabaseConfig::default());
    assert!(config.validate().is_ok());
}

#[test]
fn save_then_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let mut config = Config {
        base_dir: temp_dir.path().join("nested"),
        ..Config::default()
    };
    config.index.family = IndexFamily::Ivfflat;
    config.index.ivfflat_lists = 200;
    config.index.ivfflat_probes = 10;

    config.save().expect("should save config");
    assert!(config.config_file_path().exists());

    let loaded = Config::load_file(&config.base_dir).expect("should load saved config");
    assert_eq!(loaded, config);
}

#[test]
fn partial_file_uses_section_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[index]\ntype = \"ivfflat\"\nivfflat_probes = 4\n",
    )
    .expect("should write config");

    let config = Config::load_file(temp_dir.path()).expect("should parse partial config");

    assert_eq!(config.index.family, IndexFamily::Ivfflat);
    assert_eq!(config.index.ivfflat_probes, 4);
    assert_eq!(config.index.ivfflat_lists, 100);
    assert_eq!(config.database, DatabaseConfig::default());
}

#[test]
fn unknown_index_type_in_file_is_rejected() {
    let result: Result<Config, toml::de::Error> = toml::from_str("[index]\ntype = \"annoy\"\n");
    assert!(result.is_err());
}
