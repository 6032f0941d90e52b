use async_trait::async_trait;
use half::f16;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::schema;
use super::{
    Chunk, IndexConfiguration, IndexFamily, IndexInfo, SearchQuery, SearchResult, SessionConfig,
    StoreSession, TableSpec, TableSummary, VectorPrecision, VectorStore,
};
use crate::{AnnError, Result};


#[derive(Debug, Default)]
struct MemoryTable {
    dimension: u32,
    chunks: Vec<Chunk>,
    indexes: Vec<IndexConfiguration>,
}

/// In-process exact-scan store with the same query semantics as pgvector
///
/// ANN families are answered exactly over half precision vectors, so results
/// match what a perfect index would return.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, MemoryTable>>>,
    directives: Arc<Mutex<Vec<String>>>,
    open_sessions: Arc<AtomicUsize>,
    search_delay: Duration,
}

impl MemoryStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every query take at least `delay`
    #[inline]
    #[must_use]
    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = delay;
        self
    }

    /// Session directives applied so far, in order
    #[inline]
    pub async fn applied_directives(&self) -> Vec<String> {
        self.directives.lock().await.clone()
    }

    /// Sessions opened and not yet dropped
    #[inline]
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

fn missing_table(name: &str) -> AnnError {
    AnnError::Database(format!("relation \"{}\" does not exist", name))
}

fn dimension_mismatch(expected: u32, actual: usize) -> AnnError {
    AnnError::Database(format!(
        "expected {} dimensions, not {}",
        expected, actual
    ))
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn StoreSession>> {
        if let Some(directive) = config.index.session_directive() {
            debug!("Applying session directive: {}", directive);
            self.directives.lock().await.push(directive);
        }

        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            tables: Arc::clone(&self.tables),
            open_sessions: Arc::clone(&self.open_sessions),
            config: config.clone(),
            search_delay: self.search_delay,
        }))
    }

    async fn setup(&self, config: &SessionConfig) -> Result<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .entry(config.table.name.clone())
            .or_insert_with(|| MemoryTable {
                dimension: config.table.dimension,
                ..MemoryTable::default()
            });

        if config.index.family != IndexFamily::None
            && !table
                .indexes
                .iter()
                .any(|existing| existing.family == config.index.family)
        {
            table.indexes.push(config.index);
        }

        Ok(())
    }

    async fn insert_chunks(&self, table: &TableSpec, chunks: &[Chunk]) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .get_mut(&table.name)
            .ok_or_else(|| missing_table(&table.name))?;

        if let Some(chunk) = chunks
            .iter()
            .find(|chunk| chunk.chunk_vector.len() != stored.dimension as usize)
        {
            return Err(dimension_mismatch(
                stored.dimension,
                chunk.chunk_vector.len(),
            ));
        }

        stored.chunks.extend_from_slice(chunks);
        Ok(chunks.len())
    }

    async fn summary(&self) -> Result<Vec<TableSummary>> {
        let tables = self.tables.read().await;
        let mut summaries: Vec<TableSummary> = tables
            .iter()
            .map(|(name, table)| {
                let spec = TableSpec {
                    name: name.clone(),
                    dimension: table.dimension,
                };
                TableSummary {
                    name: name.clone(),
                    row_count: table.chunks.len() as i64,
                    columns: chunk_columns(table.dimension),
                    indexes: table
                        .indexes
                        .iter()
                        .map(|index| IndexInfo {
                            name: schema::index_name(name, index.family),
                            method: index.family.as_str().to_string(),
                            definition: schema::create_index(index, &spec).unwrap_or_default(),
                        })
                        .collect(),
                }
            })
            .collect();

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn drop_all_tables(&self) -> Result<Vec<String>> {
        let mut tables = self.tables.write().await;
        let mut names: Vec<String> = tables.drain().map(|(name, _)| name).collect();
        names.sort();
        Ok(names)
    }
}

fn chunk_columns(dimension: u32) -> Vec<(String, String)> {
    [
        ("id", "integer".to_string()),
        ("file_name", "text".to_string()),
        ("document_page", "smallint".to_string()),
        ("chunk_no", "integer".to_string()),
        ("chunk_text", "text".to_string()),
        ("model", "text".to_string()),
        ("prompt_tokens", "integer".to_string()),
        ("total_tokens", "integer".to_string()),
        ("created_date_time", "timestamp with time zone".to_string()),
        ("chunk_vector", format!("vector({})", dimension)),
        ("business_category", "text".to_string()),
    ]
    .into_iter()
    .map(|(column, data_type)| (column.to_string(), data_type))
    .collect()
}

pub struct MemorySession {
    tables: Arc<RwLock<HashMap<String, MemoryTable>>>,
    open_sessions: Arc<AtomicUsize>,
    config: SessionConfig,
    search_delay: Duration,
}

impl Drop for MemorySession {
    #[inline]
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Negative inner product, the value of pgvector's `<#>` operator
#[inline]
pub fn negative_inner_product(a: &[f32], b: &[f32], precision: VectorPrecision) -> f64 {
    let dot: f64 = match precision {
        VectorPrecision::Full => a
            .iter()
            .zip(b)
            .map(|(x, y)| f64::from(*x) * f64::from(*y))
            .sum(),
        VectorPrecision::Half => a
            .iter()
            .zip(b)
            .map(|(x, y)| f64::from(f16::from_f32(*x)) * f64::from(f16::from_f32(*y)))
            .sum(),
    };
    -dot
}

#[async_trait]
impl StoreSession for MemorySession {
    fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn query(&mut self, query: &SearchQuery, vector: &[f32]) -> Result<Vec<SearchResult>> {
        if vector.len() != query.dimension as usize {
            return Err(dimension_mismatch(query.dimension, vector.len()));
        }

        if !self.search_delay.is_zero() {
            tokio::time::sleep(self.search_delay).await;
        }

        let tables = self.tables.read().await;
        let table = tables
            .get(&query.table)
            .ok_or_else(|| missing_table(&query.table))?;

        let mut results: Vec<SearchResult> = table
            .chunks
            .iter()
            .map(|chunk| SearchResult {
                file_name: chunk.file_name.clone(),
                page: chunk.document_page,
                chunk_no: chunk.chunk_no,
                chunk_text: chunk.chunk_text.clone(),
                distance: negative_inner_product(&chunk.chunk_vector, vector, query.precision),
            })
            .collect();

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(query.top_n);
        Ok(results)
    }

    async fn row_count(&mut self) -> Result<i64> {
        let tables = self.tables.read().await;
        tables
            .get(&self.config.table.name)
            .map(|table| table.chunks.len() as i64)
            .ok_or_else(|| missing_table(&self.config.table.name))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
