// Vector store module
// Session contract, chunk and result types, and the postgres/memory backends

pub mod index;
pub mod memory;
pub mod postgres;
pub mod schema;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::Result;
use crate::config::{Config, StoreBackend};

pub use index::{IndexConfiguration, IndexFamily};
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// One embedded piece of a source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub file_name: String,
    /// 1-based page number within the source file
    pub document_page: i32,
    pub chunk_no: i32,
    pub chunk_text: String,
    pub model: String,
    pub prompt_tokens: i32,
    pub total_tokens: i32,
    /// Absent when the source row carried no readable timestamp
    pub created_date_time: Option<DateTime<Utc>>,
    pub chunk_vector: Vec<f32>,
    pub business_category: String,
}

/// A ranked candidate returned by a similarity query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_name: String,
    pub page: i32,
    pub chunk_no: i32,
    pub chunk_text: String,
    /// Negative inner product, lower is more similar
    pub distance: f64,
}

/// Representation both sides of the distance operator are cast to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorPrecision {
    Full,
    Half,
}

impl VectorPrecision {
    #[inline]
    pub fn for_family(family: IndexFamily) -> Self {
        if family.uses_half_precision() {
            Self::Half
        } else {
            Self::Full
        }
    }

    #[inline]
    pub fn type_name(self, dimension: u32) -> String {
        match self {
            Self::Full => format!("vector({})", dimension),
            Self::Half => format!("halfvec({})", dimension),
        }
    }
}

/// A chunk table and the dimensionality of its vectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub dimension: u32,
}

/// Everything a session needs to know at construction time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub index: IndexConfiguration,
    pub table: TableSpec,
}

impl SessionConfig {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            index: config.index,
            table: TableSpec {
                name: config.store.table_name(),
                dimension: config.store.dimension,
            },
        }
    }
}

/// Similarity query in its store-independent form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub table: String,
    pub dimension: u32,
    pub precision: VectorPrecision,
    pub top_n: usize,
}

impl SearchQuery {
    /// SQL with the query vector bound as `$1` (text literal) and the limit as `$2`
    #[inline]
    pub fn to_sql(&self) -> String {
        let query_vector = format!("$1::vector({})", self.dimension);
        let (stored, probe) = match self.precision {
            VectorPrecision::Full => (
                format!("chunk_vector::{}", self.precision.type_name(self.dimension)),
                query_vector,
            ),
            VectorPrecision::Half => {
                let half = self.precision.type_name(self.dimension);
                (
                    format!("chunk_vector::{}", half),
                    format!("{}::{}", query_vector, half),
                )
            }
        };

        format!(
            "SELECT file_name, document_page, chunk_no, chunk_text, \
             ({stored} <#> {probe}) AS distance \
             FROM {table} \
             ORDER BY distance ASC \
             LIMIT $2",
            stored = stored,
            probe = probe,
            table = self.table,
        )
    }
}

/// Column, row count and index overview of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub name: String,
    pub row_count: i64,
    pub columns: Vec<(String, String)>,
    pub indexes: Vec<IndexInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub method: String,
    pub definition: String,
}

/// A connection to the vector store scoped to one index configuration
///
/// Sessions are never shared between requests and never reused across
/// configurations.
#[async_trait]
pub trait StoreSession: Send {
    fn config(&self) -> &SessionConfig;

    /// Run a similarity query for `vector`
    async fn query(&mut self, query: &SearchQuery, vector: &[f32]) -> Result<Vec<SearchResult>>;

    /// Number of chunks currently stored in the session's table
    async fn row_count(&mut self) -> Result<i64>;

    /// Release the underlying connection
    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Open a session and apply the index-specific runtime directive
    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn StoreSession>>;

    /// Create the table and the configured index, skipping what already exists
    async fn setup(&self, config: &SessionConfig) -> Result<()>;

    /// Insert chunks into a table, returning the number of rows written
    async fn insert_chunks(&self, table: &TableSpec, chunks: &[Chunk]) -> Result<usize>;

    async fn summary(&self) -> Result<Vec<TableSummary>>;

    /// Drop every table, returning their names
    async fn drop_all_tables(&self) -> Result<Vec<String>>;
}

/// Build the store selected by the configuration
#[inline]
pub fn open_store(config: &Config) -> Arc<dyn VectorStore> {
    match config.store.backend {
        StoreBackend::Postgres => Arc::new(PgStore::new(
            config.database.clone(),
            config.store.insert_batch_size,
        )),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    }
}

/// Reduce an arbitrary name to a safe lowercase SQL identifier
///
/// Runs of characters outside `[A-Za-z0-9_]` collapse to one underscore and
/// names not starting with a letter get a `t_` prefix.
#[inline]
pub fn sanitize_table_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut in_separator = false;

    for c in name.chars() {
        if c.is_alphanumeric() || c == '_' {
            sanitized.push(c);
            in_separator = false;
        } else if !in_separator {
            sanitized.push('_');
            in_separator = true;
        }
    }

    if !sanitized.chars().next().is_some_and(char::is_alphabetic) {
        sanitized.insert_str(0, "t_");
    }

    sanitized.to_lowercase()
}

/// Format a vector as a pgvector text literal, e.g. `[0.1,0.2]`
#[inline]
pub fn vector_literal(vector: &[f32]) -> String {
    use itertools::Itertools;
    format!("[{}]", vector.iter().join(","))
}
