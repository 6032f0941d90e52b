// Ingest module
// Loads chunk files and plain text documents into the vector store

pub mod chunks;
pub mod queries;
pub mod runs;


use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, StoreConfig};
use crate::embeddings::{ChunkingConfig, EmbeddingProvider, split_pages, split_text};
use crate::store::{Chunk, IndexConfiguration, SessionConfig, TableSpec, VectorStore};
use crate::{AnnError, Result};

pub use chunks::{
    ChunkSource, LoadedChunks, discover_chunk_files, load_chunk_file, parse_integer,
    parse_timestamp, write_chunk_file,
};
pub use queries::{BenchmarkQuery, generate_queries, load_queries, query_file, write_queries};
pub use runs::{PipelineRun, RUN_LOG_FILE, append_run};

/// Counters for one ingest run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub chunks_inserted: usize,
    pub rows_skipped: usize,
}

/// Writes chunks into the tables of the configured partition
pub struct Ingestor {
    store: Arc<dyn VectorStore>,
    index: IndexConfiguration,
    store_config: StoreConfig,
}

impl Ingestor {
    #[inline]
    pub fn new(config: &Config, store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            index: config.index,
            store_config: config.store.clone(),
        }
    }

    fn table_spec(&self, category: &str) -> TableSpec {
        TableSpec {
            name: self.store_config.table_for_category(category),
            dimension: self.store_config.dimension,
        }
    }

    /// Create the table and index on first use within a run
    async fn prepare(&self, table: &TableSpec, prepared: &mut HashSet<String>) -> Result<()> {
        if prepared.contains(&table.name) {
            return Ok(());
        }

        self.store
            .setup(&SessionConfig {
                index: self.index,
                table: table.clone(),
            })
            .await?;
        debug!("Prepared table {} ({})", table.name, self.index.label());
        prepared.insert(table.name.clone());
        Ok(())
    }

    async fn insert_by_table(
        &self,
        chunks: Vec<Chunk>,
        prepared: &mut HashSet<String>,
    ) -> Result<usize> {
        let mut by_table: BTreeMap<String, (TableSpec, Vec<Chunk>)> = BTreeMap::new();
        for chunk in chunks {
            let table = self.table_spec(&chunk.business_category);
            by_table
                .entry(table.name.clone())
                .or_insert_with(|| (table, Vec::new()))
                .1
                .push(chunk);
        }

        let mut inserted = 0;
        for (table, chunks) in by_table.into_values() {
            self.prepare(&table, prepared).await?;
            inserted += self.store.insert_chunks(&table, &chunks).await?;
        }
        Ok(inserted)
    }

    /// Load chunk CSV files into the store
    ///
    /// Files that cannot be parsed are logged and counted; store failures
    /// abort the run.
    #[inline]
    pub async fn ingest_chunk_files(&self, files: &[PathBuf]) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        let mut prepared = HashSet::new();

        for path in files {
            let dimension = self.store_config.dimension;
            let owned = path.clone();
            let loaded = tokio::task::spawn_blocking(move || load_chunk_file(&owned, dimension))
                .await
                .map_err(|e| AnnError::Persistence(format!("load task failed: {}", e)))?;

            let loaded = match loaded {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    stats.files_failed += 1;
                    continue;
                }
            };

            stats.rows_skipped += loaded.skipped;
            let inserted = self.insert_by_table(loaded.chunks, &mut prepared).await?;
            stats.chunks_inserted += inserted;
            stats.files_processed += 1;
            info!("Inserted {} rows from {}", inserted, path.display());
        }

        Ok(stats)
    }

    /// Split, embed and store plain text documents
    ///
    /// Pages are separated by form feeds and numbered from 1. Chunks are
    /// numbered from 1 across the whole document. When `chunk_dir` is given
    /// the embedded chunks are also written to `<chunk_dir>/<category>/<stem>.csv`.
    #[inline]
    pub async fn ingest_documents(
        &self,
        files: &[PathBuf],
        embedder: &dyn EmbeddingProvider,
        chunking: &ChunkingConfig,
        category: &str,
        chunk_dir: Option<&Path>,
    ) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        let mut prepared = HashSet::new();

        for path in files {
            let text = match tokio::fs::read_to_string(path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    stats.files_failed += 1;
                    continue;
                }
            };

            let chunks = embed_document(path, &text, embedder, chunking, category).await?;
            if chunks.is_empty() {
                warn!("{} produced no chunks", path.display());
            }

            if let Some(chunk_dir) = chunk_dir {
                let stem = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let csv_path = chunk_dir.join(category).join(format!("{}.csv", stem));
                write_chunk_file(&csv_path, &chunks)?;
                debug!("Wrote chunk file {}", csv_path.display());
            }

            let inserted = self.insert_by_table(chunks, &mut prepared).await?;
            stats.chunks_inserted += inserted;
            stats.files_processed += 1;
            info!("Inserted {} chunks from {}", inserted, path.display());
        }

        Ok(stats)
    }
}

/// Split one document into page chunks and embed each of them
#[inline]
pub async fn embed_document(
    path: &Path,
    text: &str,
    embedder: &dyn EmbeddingProvider,
    chunking: &ChunkingConfig,
    category: &str,
) -> Result<Vec<Chunk>> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut chunks = Vec::new();
    let mut chunk_no = 0;

    for (page, page_text) in split_pages(text) {
        for piece in split_text(&page_text, chunking) {
            chunk_no += 1;
            let embedding = embedder.embed(&piece).await?;
            chunks.push(Chunk {
                file_name: file_name.clone(),
                document_page: page,
                chunk_no,
                chunk_text: piece,
                model: embedding.model,
                prompt_tokens: embedding.prompt_tokens,
                total_tokens: embedding.total_tokens,
                created_date_time: Some(Utc::now()),
                chunk_vector: embedding.vector,
                business_category: category.to_string(),
            });
        }
    }

    debug!("{} split into {} chunks", file_name, chunks.len());
    Ok(chunks)
}
