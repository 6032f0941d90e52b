// Configuration management module
// TOML settings with deployment environment overrides

pub mod display;
pub mod settings;

#[cfg(test)]
mod tests;

pub use display::show_config;
pub use settings::{
    Config, ConfigError, DatabaseConfig, EmbeddingConfig, EmbeddingProviderKind, MetricsConfig,
    OutputConfig, Partition, SamplingConfig, ServerConfig, StoreBackend, StoreConfig,
};

/// Resolve the configuration directory, preferring an explicit override
#[inline]
pub fn resolve_config_dir(
    override_dir: Option<std::path::PathBuf>,
) -> Result<std::path::PathBuf, ConfigError> {
    match override_dir {
        Some(dir) => Ok(dir),
        None => Config::default_dir(),
    }
}
