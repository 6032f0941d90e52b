use chrono::{DateTime, Utc};
use std::path::Path;

use crate::Result;
use crate::stats::{CsvTable, round_to};
use crate::store::IndexFamily;

pub const RUN_LOG_FILE: &str = "pipeline_runs.csv";

/// One ingest step as recorded in the run log
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub filename: String,
    pub index_type: IndexFamily,
    pub num_of_rows: usize,
    /// Seconds
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
}

/// Append a run to the log, numbering it after the highest existing index
///
/// Returns the index assigned to the run.
#[inline]
pub fn append_run(path: &Path, run: &PipelineRun) -> Result<u64> {
    let mut table = CsvTable::read(path)?.unwrap_or_else(|| {
        CsvTable::with_headers([
            "index",
            "filename",
            "index_type",
            "num_of_rows",
            "execution_time",
            "timestamp",
        ])
    });

    let index = (0..table.rows.len())
        .filter_map(|row| table.get(row, "index"))
        .filter_map(|cell| cell.trim().parse::<u64>().ok())
        .max()
        .map_or(0, |max| max + 1);

    table.push_row(&[
        ("index".to_string(), index.to_string()),
        ("filename".to_string(), run.filename.clone()),
        (
            "index_type".to_string(),
            run.index_type.as_str().to_uppercase(),
        ),
        ("num_of_rows".to_string(), run.num_of_rows.to_string()),
        (
            "execution_time".to_string(),
            round_to(run.execution_time, 2).to_string(),
        ),
        (
            "timestamp".to_string(),
            run.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        ),
    ]);
    table.write(path)?;

    Ok(index)
}
