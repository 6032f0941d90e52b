use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::Config;
use crate::embeddings::{EmbeddingProvider, OpenAiClient};
use crate::ingest::{
    ChunkSource, IngestStats, Ingestor, PipelineRun, RUN_LOG_FILE, append_run,
    discover_chunk_files, generate_queries as sample_queries, load_queries, query_file,
    write_queries,
};
use crate::metrics::{DockerStatsClient, ResourceSampler};
use crate::search::{QueryPipeline, QueryRequest};
use crate::server::{self, ServerState};
use crate::stats::{AggregatedStat, MeasurementWriter, Window, aggregate_file, write_summaries};
use crate::store::{SessionConfig, open_store};

/// What the ingest command reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestInput {
    /// Chunk CSV files below the chunk directory
    ChunkFiles { all: bool },
    /// Plain text documents to split and embed
    Documents { files: Vec<PathBuf>, export: bool },
}

/// Target of a single ad hoc search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    pub file_name: String,
    pub page: i32,
}

fn embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let client =
        OpenAiClient::new(&config.embedding).context("Failed to initialize embedding client")?;
    Ok(Arc::new(client))
}

fn sampler(config: &Config) -> Result<ResourceSampler> {
    if !config.metrics.enabled {
        info!("Resource sampling disabled");
        return Ok(ResourceSampler::disabled());
    }

    let client =
        DockerStatsClient::new(&config.metrics).context("Failed to initialize Docker client")?;
    Ok(ResourceSampler::new(Arc::new(client)))
}

fn pipeline(config: &Config) -> Result<QueryPipeline> {
    Ok(QueryPipeline::new(
        config,
        embedder(config)?,
        open_store(config),
        sampler(config)?,
    ))
}

fn progress_bar(len: usize, action: &str) -> ProgressBar {
    if console::user_attended_stderr() {
        ProgressBar::new(len as u64).with_style(
            ProgressStyle::with_template(&format!("{{spinner}} [{{pos}}/{{len}}] {} {{msg}}", action))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        )
    } else {
        ProgressBar::hidden()
    }
}

/// Run the WebSocket query server
#[inline]
pub async fn serve(config: &Config, category: Option<String>) -> Result<()> {
    let mut pipeline = pipeline(config)?;
    if let Some(category) = &category {
        pipeline = pipeline.with_table(config.store.table_for_category(category));
    }
    let state = ServerState::new(pipeline, MeasurementWriter::new(&config.output.results_dir))
        .with_category(category);
    let router = server::router(Arc::new(state), &config.server.allowed_origin)
        .context("Failed to build router")?;

    eprintln!(
        "{} {} on {}:{}",
        style("Serving").green().bold(),
        config.index.label(),
        config.server.host,
        config.server.port
    );
    server::serve(router, &config.server.host, config.server.port)
        .await
        .context("Query server failed")?;
    Ok(())
}

/// Create the extension, table and configured index
#[inline]
pub async fn setup(config: &Config) -> Result<()> {
    let store = open_store(config);
    let session = SessionConfig::from_config(config);

    store
        .setup(&session)
        .await
        .with_context(|| format!("Failed to set up table {}", session.table.name))?;

    println!(
        "✓ Table {} ready with index {}",
        session.table.name,
        config.index.label()
    );
    Ok(())
}

/// Load chunks or documents into the store and log the run
#[inline]
pub async fn ingest(config: &Config, input: IngestInput, category: Option<String>) -> Result<()> {
    let store = open_store(config);
    let ingestor = Ingestor::new(config, store);
    let started = Instant::now();

    let (label, stats): (&str, IngestStats) = match input {
        IngestInput::ChunkFiles { all } => {
            let source = if all {
                ChunkSource::All
            } else {
                ChunkSource::Categories
            };
            let excluded = [
                config.output.search_dir.clone(),
                config.output.results_dir.clone(),
            ];
            let files = discover_chunk_files(&config.output.chunk_dir, source, &excluded)
                .context("Failed to find chunk files")?;
            if files.is_empty() {
                println!(
                    "No chunk files found under {}",
                    config.output.chunk_dir.display()
                );
                return Ok(());
            }

            println!("Loading {} chunk files", files.len());
            let stats = ingestor
                .ingest_chunk_files(&files)
                .await
                .context("Failed to ingest chunk files")?;
            ("ingest-chunks", stats)
        }
        IngestInput::Documents { files, export } => {
            let category = category.unwrap_or_else(|| config.store.category.clone());
            let embedder = embedder(config)?;
            let chunk_dir = export.then_some(config.output.chunk_dir.as_path());

            let stats = ingestor
                .ingest_documents(
                    &files,
                    embedder.as_ref(),
                    &config.chunking,
                    &category,
                    chunk_dir,
                )
                .await
                .context("Failed to ingest documents")?;
            ("ingest-documents", stats)
        }
    };

    let execution_time = started.elapsed().as_secs_f64();
    println!("✓ Ingest finished in {:.2}s", execution_time);
    println!("  Files processed: {}", stats.files_processed);
    println!("  Chunks inserted: {}", stats.chunks_inserted);
    if stats.rows_skipped > 0 {
        println!("  Rows skipped: {}", stats.rows_skipped);
    }
    if stats.files_failed > 0 {
        println!("  {} Files failed: {}", style("⚠").yellow(), stats.files_failed);
    }

    let run = PipelineRun {
        filename: label.to_string(),
        index_type: config.index.family,
        num_of_rows: stats.chunks_inserted,
        execution_time,
        timestamp: chrono::Utc::now(),
    };
    let log_path = config.output.results_dir.join(RUN_LOG_FILE);
    if let Err(e) = append_run(&log_path, &run) {
        warn!("Failed to append run log {}: {}", log_path.display(), e);
    }

    Ok(())
}

/// Run one measured query and print the ranked results
#[inline]
pub async fn search(
    config: &Config,
    question: String,
    top_n: Option<i64>,
    target: Option<SearchTarget>,
    record: bool,
) -> Result<()> {
    let mut request = QueryRequest::new(question);
    request.top_n = top_n;
    if let Some(target) = target {
        request = request.with_target(target.file_name, target.page);
    }

    let outcome = pipeline(config)?.run(&request).await.context("Search failed")?;

    println!(
        "{} results in {:.4}s ({})",
        outcome.response.results.len(),
        outcome.response.search_time,
        config.index.label()
    );
    if let Some(rank) = outcome.response.target_rank {
        println!("Target rank: {}", style(rank).cyan());
    }
    println!();

    for (position, result) in outcome.response.results.iter().enumerate() {
        println!(
            "{:>3}. {} (distance {:.4})",
            position + 1,
            style(&result.link_text).bold(),
            result.distance
        );
        let preview: String = result.chunk_text.chars().take(160).collect();
        println!("     {}", style(preview.replace('\n', " ")).dim());
    }

    if record {
        let writer = MeasurementWriter::new(&config.output.results_dir);
        let records = Window::ALL
            .iter()
            .map(|window| (*window, outcome.record(*window)))
            .collect();
        writer
            .append_windows(records, None)
            .await
            .context("Failed to record measurements")?;
    }

    Ok(())
}

/// Run every generated query of a category and record the measurements
#[inline]
pub async fn auto_search(config: &Config, category: Option<String>) -> Result<()> {
    let category = category.unwrap_or_else(|| config.store.category.clone());
    let queries_path = query_file(&config.output.search_dir, &category);
    let queries = load_queries(&queries_path)
        .with_context(|| format!("Failed to load queries from {}", queries_path.display()))?;

    let pipeline = pipeline(config)?.with_table(config.store.table_for_category(&category));
    let writer = MeasurementWriter::new(&config.output.results_dir);
    let top_n = config.output.auto_search_top_n;

    let bar = progress_bar(queries.len(), "Searching");
    let mut failures = 0_usize;

    for (index, query) in queries.iter().enumerate() {
        bar.set_message(query.search_text.chars().take(40).collect::<String>());

        let Some(request) = query.to_request(top_n) else {
            warn!(
                "Query {} has an invalid page {:?}, skipping",
                index + 1,
                query.document_page
            );
            failures += 1;
            bar.inc(1);
            continue;
        };

        match pipeline.run(&request).await {
            Ok(outcome) => {
                let records = Window::ALL
                    .iter()
                    .map(|window| (*window, outcome.record(*window)))
                    .collect();
                if let Err(e) = writer.append_windows(records, Some(&category)).await {
                    warn!("Failed to record query {}: {}", index + 1, e);
                }
            }
            Err(e) => {
                warn!("Query {} failed: {}", index + 1, e);
                failures += 1;
            }
        }

        info!("Processed {}/{} searches", index + 1, queries.len());
        bar.inc(1);
    }
    bar.finish_and_clear();

    println!(
        "✓ Ran {} queries for {} ({} failed)",
        queries.len(),
        category,
        failures
    );
    let during = config
        .output
        .results_dir
        .join(Window::During.file_name(Some(&category)));
    if during.exists() {
        print_stats(&aggregate_file(&during).context("Failed to aggregate results")?);
    }

    Ok(())
}

/// Sample benchmark queries from a category's chunk files
#[inline]
pub fn generate_queries(config: &Config, category: Option<String>, seed: Option<u64>) -> Result<()> {
    let category = category.unwrap_or_else(|| config.store.category.clone());
    let category_dir = config.output.chunk_dir.join(&category);
    let mut rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);

    let queries = sample_queries(
        &category_dir,
        crate::ingest::queries::SAMPLES_PER_FILE,
        &mut rng,
    )
    .with_context(|| format!("Failed to sample queries from {}", category_dir.display()))?;

    let path = query_file(&config.output.search_dir, &category);
    write_queries(&path, &queries)?;

    println!("Search CSV file has been generated: {}", path.display());
    println!("Total rows in search CSV: {}", queries.len());
    Ok(())
}

/// Write averaged summaries of measurement files
///
/// Without explicit files, every window file of the category (or the
/// uncategorized ones) in the results directory is summarized.
#[inline]
pub fn aggregate(config: &Config, files: Vec<PathBuf>, category: Option<&str>) -> Result<()> {
    let files = if files.is_empty() {
        Window::ALL
            .iter()
            .map(|window| {
                config
                    .output
                    .results_dir
                    .join(window.file_name(category))
            })
            .filter(|path| path.exists())
            .collect()
    } else {
        files
    };

    if files.is_empty() {
        println!(
            "No measurement files found in {}",
            config.output.results_dir.display()
        );
        return Ok(());
    }

    for file in files {
        let (per_row, summary) = write_summaries(&file)
            .with_context(|| format!("Failed to aggregate {}", file.display()))?;
        println!("{}", style(file.display()).bold());
        print_stats(&aggregate_file(&file)?);
        println!("  → {}", per_row.display());
        println!("  → {}", summary.display());
        println!();
    }

    Ok(())
}

fn print_stats(stats: &[AggregatedStat]) {
    let format = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| v.to_string());

    for stat in stats {
        let parameters: Vec<String> = stat
            .key
            .pairs()
            .skip(1)
            .map(|(column, value)| format!("{}={}", column, value))
            .collect();
        println!(
            "  {} [{}]: n={}, search_time={}, target_rank={}, usage={}",
            style(stat.key.index_type()).cyan(),
            parameters.join(", "),
            stat.count,
            format(stat.mean_search_time),
            format(stat.mean_target_rank),
            format(stat.mean_usage)
        );
    }
}

/// Show tables, row counts and indexes in the store
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    let store = open_store(config);
    let tables = store
        .summary()
        .await
        .context("Failed to read store summary")?;

    if tables.is_empty() {
        println!("No tables found.");
        println!("Use 'pgvector-ann setup' to create one.");
        return Ok(());
    }

    println!("Tables ({} total):", tables.len());
    println!();
    for table in &tables {
        println!("📦 {} ({} rows)", style(&table.name).bold(), table.row_count);
        for (column, data_type) in &table.columns {
            println!("   {}: {}", column, style(data_type).dim());
        }
        if table.indexes.is_empty() {
            println!("   Indexes: none");
        }
        for index in &table.indexes {
            println!("   Index {} ({})", index.name, style(&index.method).cyan());
            println!("     {}", style(&index.definition).dim());
        }
        println!();
    }

    Ok(())
}

/// Drop every table in the store
#[inline]
pub async fn drop_tables(config: &Config, confirmed: bool) -> Result<()> {
    if !confirmed {
        println!("This drops every table in the public schema and cannot be undone.");
        println!("Re-run with --yes to continue.");
        return Ok(());
    }

    let store = open_store(config);
    let dropped = store
        .drop_all_tables()
        .await
        .context("Failed to drop tables")?;

    if dropped.is_empty() {
        println!("No tables to drop.");
    }
    for name in dropped {
        println!("✓ Dropped {}", name);
    }
    Ok(())
}

/// Write the effective configuration to `config.toml`
#[inline]
pub fn write_config(config: &Config) -> Result<()> {
    config.save()?;
    println!(
        "✓ Configuration saved to {}",
        config.config_file_path().display()
    );
    Ok(())
}
