// Stats module
// Measurement records, CSV persistence and per-configuration aggregation

pub mod aggregate;
pub mod table;
pub mod writer;

#[cfg(test)]
mod tests;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::ResourceSample;
use crate::search::RecallTarget;
use crate::store::IndexConfiguration;

pub use aggregate::{
    AggregatedStat, ConfigKey, aggregate, aggregate_file, aggregate_records, round_to,
    write_summaries,
};
pub use table::CsvTable;
pub use writer::MeasurementWriter;

/// Columns identifying the index configuration, in file order
pub const CONFIG_COLUMNS: [&str; 6] = [
    "index_type",
    "hnsw_m",
    "hnsw_ef_construction",
    "hnsw_ef_search",
    "ivfflat_lists",
    "ivfflat_probes",
];

pub const OUTCOME_COLUMNS: [&str; 3] = ["search_time", "target_rank", "num_of_rows"];

pub const IDENTITY_COLUMNS: [&str; 4] = ["keyword", "filepath", "page", "timestamp"];

/// Fixed resource columns; named sub-metrics follow in name order
pub const METRIC_COLUMNS: [&str; 3] = ["sampled_at", "usage", "limit"];

/// Sampling window relative to the similarity query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Before,
    During,
    After,
}

impl Window {
    pub const ALL: [Self; 3] = [Self::Before, Self::During, Self::After];

    #[inline]
    pub fn stem(self) -> &'static str {
        match self {
            Self::Before => "before_search",
            Self::During => "during_search",
            Self::After => "after_search",
        }
    }

    /// Measurement file for this window, optionally suffixed with a category
    #[inline]
    pub fn file_name(self, category: Option<&str>) -> String {
        match category {
            Some(category) => format!("{}_{}.csv", self.stem(), category),
            None => format!("{}.csv", self.stem()),
        }
    }
}

/// One query under one index configuration, with the samples of one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub index: IndexConfiguration,
    /// Absent when the table could not be counted
    pub num_of_rows: Option<i64>,
    /// Seconds
    pub search_time: f64,
    pub target_rank: Option<usize>,
    pub keyword: String,
    pub target: Option<RecallTarget>,
    pub timestamp: DateTime<Utc>,
    pub samples: Vec<ResourceSample>,
}

fn timestamp_cell(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn optional_cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl MeasurementRecord {
    fn leading_cells(&self) -> Vec<(String, String)> {
        let index = &self.index;
        let values = [
            index.family.to_string(),
            index.hnsw_m.to_string(),
            index.hnsw_ef_construction.to_string(),
            index.hnsw_ef_search.to_string(),
            index.ivfflat_lists.to_string(),
            index.ivfflat_probes.to_string(),
            self.search_time.to_string(),
            optional_cell(self.target_rank),
            optional_cell(self.num_of_rows),
            self.keyword.clone(),
            optional_cell(self.target.as_ref().map(|t| t.file_name.clone())),
            optional_cell(self.target.as_ref().map(|t| t.page)),
            timestamp_cell(&self.timestamp),
        ];

        CONFIG_COLUMNS
            .iter()
            .chain(OUTCOME_COLUMNS.iter())
            .chain(IDENTITY_COLUMNS.iter())
            .map(|column| (*column).to_string())
            .zip(values)
            .collect()
    }

    /// Flattened rows, one per resource sample
    ///
    /// A record without samples still yields one row with empty metric cells
    /// so the query outcome is never lost.
    #[inline]
    pub fn rows(&self) -> Vec<Vec<(String, String)>> {
        let leading = self.leading_cells();

        if self.samples.is_empty() {
            let mut row = leading;
            row.extend(
                METRIC_COLUMNS
                    .iter()
                    .map(|column| ((*column).to_string(), String::new())),
            );
            return vec![row];
        }

        self.samples
            .iter()
            .map(|sample| {
                let mut row = leading.clone();
                row.push((METRIC_COLUMNS[0].to_string(), timestamp_cell(&sample.timestamp)));
                row.push((METRIC_COLUMNS[1].to_string(), optional_cell(sample.memory_usage)));
                row.push((METRIC_COLUMNS[2].to_string(), optional_cell(sample.memory_limit)));
                row.extend(
                    sample
                        .submetrics
                        .iter()
                        .map(|(name, value)| (name.clone(), value.to_string())),
                );
                row
            })
            .collect()
    }
}
