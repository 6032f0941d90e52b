use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::search::{QueryRequest, parse_page};
use crate::stats::CsvTable;
use crate::{AnnError, Result};

pub const QUERY_COLUMNS: [&str; 4] = ["file_name", "document_page", "search_text", "chunk_text"];

/// Rows sampled from each chunk file
pub const SAMPLES_PER_FILE: usize = 10;

/// A benchmark query with the page it was taken from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkQuery {
    pub file_name: String,
    pub document_page: String,
    pub search_text: String,
    pub chunk_text: String,
}

impl BenchmarkQuery {
    /// Request targeting the page the query text was taken from
    #[inline]
    pub fn to_request(&self, top_n: i64) -> Option<QueryRequest> {
        let page = parse_page(&self.document_page)?;
        Some(
            QueryRequest::new(self.search_text.clone())
                .with_top_n(top_n)
                .with_target(self.file_name.clone(), page),
        )
    }
}

/// File holding the generated queries of a category
#[inline]
pub fn query_file(search_dir: &Path, category: &str) -> PathBuf {
    search_dir.join(format!("search_{}.csv", category))
}

fn first_line(text: &str) -> &str {
    text.split('\n').next().unwrap_or_default()
}

/// Sample benchmark queries from the chunk files directly inside `category_dir`
///
/// Up to `per_file` rows are drawn from each file and the first line of each
/// chunk becomes the query text. Only the first query per (file, page) pair
/// is kept.
#[inline]
pub fn generate_queries(
    category_dir: &Path,
    per_file: usize,
    rng: &mut fastrand::Rng,
) -> Result<Vec<BenchmarkQuery>> {
    let entries = fs::read_dir(category_dir).map_err(|e| {
        AnnError::Persistence(format!("failed to read {}: {}", category_dir.display(), e))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        {
            files.push(path);
        }
    }
    files.sort();

    let mut seen = HashSet::new();
    let mut queries = Vec::new();

    for path in files {
        let Some(table) = CsvTable::read(&path)? else {
            continue;
        };
        if table.column("chunk_text").is_none() {
            warn!("{} has no chunk_text column, skipping", path.display());
            continue;
        }

        let mut picked: Vec<usize> = if table.rows.len() <= per_file {
            (0..table.rows.len()).collect()
        } else {
            rng.choose_multiple(0..table.rows.len(), per_file)
        };
        picked.sort_unstable();

        for row in picked {
            let cell = |column: &str| table.get(row, column).unwrap_or_default().to_string();
            let query = BenchmarkQuery {
                file_name: cell("file_name"),
                document_page: cell("document_page"),
                search_text: first_line(&cell("chunk_text")).to_string(),
                chunk_text: cell("chunk_text"),
            };

            if seen.insert((query.file_name.clone(), query.document_page.clone())) {
                queries.push(query);
            }
        }
    }

    Ok(queries)
}

#[inline]
pub fn write_queries(path: &Path, queries: &[BenchmarkQuery]) -> Result<()> {
    let mut table = CsvTable::with_headers(QUERY_COLUMNS);
    table.rows = queries
        .iter()
        .map(|query| {
            vec![
                query.file_name.clone(),
                query.document_page.clone(),
                query.search_text.clone(),
                query.chunk_text.clone(),
            ]
        })
        .collect();
    table.write(path)?;

    info!("Wrote {} queries to {}", queries.len(), path.display());
    Ok(())
}

#[inline]
pub fn load_queries(path: &Path) -> Result<Vec<BenchmarkQuery>> {
    let table = CsvTable::read(path)?
        .ok_or_else(|| AnnError::Persistence(format!("{} not found", path.display())))?;

    for column in ["file_name", "document_page", "search_text"] {
        if table.column(column).is_none() {
            return Err(AnnError::InvalidArgument(format!(
                "{} has no {} column",
                path.display(),
                column
            )));
        }
    }

    Ok((0..table.rows.len())
        .map(|row| {
            let cell = |column: &str| table.get(row, column).unwrap_or_default().to_string();
            BenchmarkQuery {
                file_name: cell("file_name"),
                document_page: cell("document_page"),
                search_text: cell("search_text"),
                chunk_text: cell("chunk_text"),
            }
        })
        .collect())
}
