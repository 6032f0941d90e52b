use console::style;

use super::{Config, StoreBackend};

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        "(not set)".to_string()
    } else {
        "********".to_string()
    }
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Database:").bold().yellow());
    eprintln!(
        "  Host: {}:{}",
        style(&config.database.host).cyan(),
        style(config.database.port).cyan()
    );
    eprintln!("  Name: {}", style(&config.database.name).cyan());
    eprintln!("  User: {}", style(&config.database.user).cyan());
    eprintln!("  Password: {}", style(mask(&config.database.password)).dim());

    eprintln!();
    eprintln!("{}", style("Index:").bold().yellow());
    eprintln!("  Type: {}", style(config.index.family).cyan());
    eprintln!("  Configuration: {}", style(config.index.label()).cyan());

    eprintln!();
    eprintln!("{}", style("Store:").bold().yellow());
    let backend = match config.store.backend {
        StoreBackend::Postgres => "postgres",
        StoreBackend::Memory => "memory",
    };
    eprintln!("  Backend: {}", style(backend).cyan());
    eprintln!("  Table: {}", style(config.store.table_name()).cyan());
    eprintln!("  Category: {}", style(&config.store.category).cyan());
    eprintln!("  Dimension: {}", style(config.store.dimension).cyan());

    eprintln!();
    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.embedding.base_url).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  API key: {}", style(mask(&config.embedding.api_key)).dim());

    eprintln!();
    eprintln!("{}", style("Metrics:").bold().yellow());
    if config.metrics.enabled {
        eprintln!("  Docker API: {}", style(&config.metrics.docker_url).cyan());
        eprintln!(
            "  Container: {}",
            style(&config.metrics.container_name).cyan()
        );
    } else {
        eprintln!("  {}", style("Disabled").dim());
    }
    eprintln!(
        "  Windows (ms): before {} / during {} / after {} every {}",
        config.sampling.before_ms,
        config.sampling.during_ms,
        config.sampling.after_ms,
        config.sampling.interval_ms
    );

    eprintln!();
    eprintln!(
        "Results directory: {}",
        style(config.output.results_dir.display()).cyan()
    );
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}
