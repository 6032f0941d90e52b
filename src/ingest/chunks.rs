use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::search::parse_page;
use crate::stats::CsvTable;
use crate::store::{Chunk, vector_literal};
use crate::{AnnError, Result};

pub const CHUNK_COLUMNS: [&str; 10] = [
    "file_name",
    "document_page",
    "chunk_no",
    "chunk_text",
    "model",
    "prompt_tokens",
    "total_tokens",
    "created_date_time",
    "chunk_vector",
    "business_category",
];

const REQUIRED_COLUMNS: [&str; 4] = ["file_name", "document_page", "chunk_text", "chunk_vector"];

/// Directory holding the combined chunk file in `all` mode
pub const ALL_DIR: &str = "all";

/// Which chunk files an ingest run reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSource {
    /// Only `<root>/all/all.csv`
    All,
    /// Every CSV below the root except the `all` directory
    Categories,
}

/// Chunks read from one file plus the number of rows that were rejected
#[derive(Debug, Clone, Default)]
pub struct LoadedChunks {
    pub chunks: Vec<Chunk>,
    pub skipped: usize,
    /// Rows kept without a creation time because theirs could not be read
    pub unreadable_timestamps: usize,
}

/// Parse a vector written as `[0.1, 0.2, ...]`
#[inline]
pub fn parse_vector(cell: &str) -> Result<Vec<f32>> {
    serde_json::from_str(cell.trim())
        .map_err(|e| AnnError::InvalidArgument(format!("invalid vector literal: {}", e)))
}

/// Parse a creation timestamp
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` with an optional numeric
/// offset, and the same form followed by a `UTC`, `GMT` or `Z` zone name.
#[inline]
pub fn parse_timestamp(cell: &str) -> Option<DateTime<Utc>> {
    let cell = cell.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(cell) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = ["UTC", "GMT", "Z"]
        .iter()
        .find_map(|zone| cell.strip_suffix(zone))
        .map_or(cell, str::trim_end);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse an integer cell, accepting integral floats such as `"7.0"`
#[inline]
pub fn parse_integer(cell: &str) -> Option<i32> {
    let trimmed = cell.trim();
    if let Ok(value) = trimmed.parse::<i32>() {
        return Some(value);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if value.fract() != 0.0 || value < f64::from(i32::MIN) || value > f64::from(i32::MAX) {
        return None;
    }
    Some(value as i32)
}

fn category_of(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read a chunk CSV, keeping only vectors of `dimension` components
///
/// Rows with a missing category take the name of the file's directory.
#[inline]
pub fn load_chunk_file(path: &Path, dimension: u32) -> Result<LoadedChunks> {
    let table = CsvTable::read(path)?
        .ok_or_else(|| AnnError::Persistence(format!("{} not found", path.display())))?;

    for column in REQUIRED_COLUMNS {
        if table.column(column).is_none() {
            return Err(AnnError::InvalidArgument(format!(
                "{} has no {} column",
                path.display(),
                column
            )));
        }
    }

    let default_category = category_of(path);
    let expected = dimension as usize;
    let mut loaded = LoadedChunks::default();

    for row in 0..table.rows.len() {
        let cell = |column: &str| table.get(row, column).unwrap_or_default();

        let vector = match parse_vector(cell("chunk_vector")) {
            Ok(vector) => vector,
            Err(e) => {
                warn!("{} row {}: {}. Skipping.", path.display(), row + 1, e);
                loaded.skipped += 1;
                continue;
            }
        };
        if vector.len() != expected {
            warn!(
                "Incorrect vector dimension in {} row {}. Expected {}, got {}. Skipping.",
                path.display(),
                row + 1,
                expected,
                vector.len()
            );
            loaded.skipped += 1;
            continue;
        }

        let Some(document_page) = parse_page(cell("document_page")) else {
            warn!(
                "{} row {}: invalid page {:?}. Skipping.",
                path.display(),
                row + 1,
                cell("document_page")
            );
            loaded.skipped += 1;
            continue;
        };

        let Some(chunk_no) = parse_integer(cell("chunk_no")) else {
            warn!(
                "{} row {}: invalid chunk number {:?}. Skipping.",
                path.display(),
                row + 1,
                cell("chunk_no")
            );
            loaded.skipped += 1;
            continue;
        };

        let raw_timestamp = cell("created_date_time");
        let created_date_time = parse_timestamp(raw_timestamp);
        if created_date_time.is_none() && !raw_timestamp.trim().is_empty() {
            warn!(
                "{} row {}: unreadable timestamp {:?}, leaving it empty",
                path.display(),
                row + 1,
                raw_timestamp
            );
            loaded.unreadable_timestamps += 1;
        }

        let category = cell("business_category").trim();
        loaded.chunks.push(Chunk {
            file_name: cell("file_name").to_string(),
            document_page,
            chunk_no,
            chunk_text: cell("chunk_text").to_string(),
            model: cell("model").to_string(),
            prompt_tokens: parse_integer(cell("prompt_tokens")).unwrap_or_default(),
            total_tokens: parse_integer(cell("total_tokens")).unwrap_or_default(),
            created_date_time,
            chunk_vector: vector,
            business_category: if category.is_empty() {
                default_category.clone()
            } else {
                category.to_string()
            },
        });
    }

    debug!(
        "Loaded {} chunks from {} ({} skipped)",
        loaded.chunks.len(),
        path.display(),
        loaded.skipped
    );
    Ok(loaded)
}

/// Write chunks in the layout `load_chunk_file` reads
#[inline]
pub fn write_chunk_file(path: &Path, chunks: &[Chunk]) -> Result<()> {
    let mut table = CsvTable::with_headers(CHUNK_COLUMNS);
    for chunk in chunks {
        table.rows.push(vec![
            chunk.file_name.clone(),
            chunk.document_page.to_string(),
            chunk.chunk_no.to_string(),
            chunk.chunk_text.clone(),
            chunk.model.clone(),
            chunk.prompt_tokens.to_string(),
            chunk.total_tokens.to_string(),
            chunk
                .created_date_time
                .map(|timestamp| timestamp.to_rfc3339())
                .unwrap_or_default(),
            vector_literal(&chunk.chunk_vector),
            chunk.business_category.clone(),
        ]);
    }
    table.write(path)
}

fn collect_csv_files(dir: &Path, excluded: &[PathBuf], files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AnnError::Persistence(format!("failed to read {}: {}", dir.display(), e)))?;

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            let is_all = path.file_name().is_some_and(|name| name == ALL_DIR);
            if !is_all && !excluded.iter().any(|skip| skip == &path) {
                collect_csv_files(&path, excluded, files)?;
            }
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        {
            files.push(path);
        }
    }
    Ok(())
}

/// Chunk files below `root`, sorted by path
///
/// Directories listed in `excluded` (such as the query and result
/// directories) are not descended into.
#[inline]
pub fn discover_chunk_files(
    root: &Path,
    source: ChunkSource,
    excluded: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    match source {
        ChunkSource::All => {
            let path = root.join(ALL_DIR).join("all.csv");
            if path.exists() {
                Ok(vec![path])
            } else {
                warn!("all.csv file not found at {}", path.display());
                Ok(Vec::new())
            }
        }
        ChunkSource::Categories => {
            let mut files = Vec::new();
            if root.is_dir() {
                collect_csv_files(root, excluded, &mut files)?;
            } else {
                warn!("Chunk directory {} does not exist", root.display());
            }
            files.sort();
            Ok(files)
        }
    }
}
