use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use super::{CONFIG_COLUMNS, CsvTable, MeasurementRecord};
use crate::{AnnError, Result};

/// Values of the configuration columns, in `CONFIG_COLUMNS` order
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigKey(pub Vec<String>);

impl ConfigKey {
    fn of_row(table: &CsvTable, row: usize) -> Self {
        Self(
            CONFIG_COLUMNS
                .iter()
                .map(|column| table.get(row, column).unwrap_or_default().to_string())
                .collect(),
        )
    }

    #[inline]
    pub fn index_type(&self) -> &str {
        self.0.first().map_or("", String::as_str)
    }

    #[inline]
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        CONFIG_COLUMNS
            .iter()
            .copied()
            .zip(self.0.iter().map(String::as_str))
    }
}

/// Per-configuration summary of a measurement file
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedStat {
    pub key: ConfigKey,
    /// Seconds, 4 decimals
    pub mean_search_time: Option<f64>,
    /// 1 decimal; rows without a rank are excluded
    pub mean_target_rank: Option<f64>,
    /// Bytes, 1 decimal; rows without a usage reading are excluded
    pub mean_usage: Option<f64>,
    /// Rows in the group
    pub count: usize,
    pub first_num_of_rows: Option<String>,
    pub first_usage: Option<String>,
}

#[derive(Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.sum += value;
            self.count += 1;
        }
    }

    fn rounded(&self, decimals: i32) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let mean = self.sum / self.count as f64;
        Some(round_to(mean, decimals))
    }
}

#[derive(Default)]
struct Group {
    search_time: Mean,
    target_rank: Mean,
    usage: Mean,
    count: usize,
    first_num_of_rows: Option<String>,
    first_usage: Option<String>,
}

#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

fn numeric(table: &CsvTable, row: usize, column: &str) -> Option<f64> {
    table
        .get(row, column)
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .and_then(|cell| cell.parse().ok())
}

fn non_empty(table: &CsvTable, row: usize, column: &str) -> Option<String> {
    table
        .get(row, column)
        .filter(|cell| !cell.trim().is_empty())
        .map(str::to_string)
}

/// Group rows by configuration and average latency, rank and memory usage
///
/// Groups come out in key order so repeated runs produce identical files.
#[inline]
pub fn aggregate(table: &CsvTable) -> Vec<AggregatedStat> {
    let mut groups: BTreeMap<ConfigKey, Group> = BTreeMap::new();

    for row in 0..table.rows.len() {
        let group = groups.entry(ConfigKey::of_row(table, row)).or_default();
        group.count += 1;
        group.search_time.add(numeric(table, row, "search_time"));
        group.target_rank.add(numeric(table, row, "target_rank"));
        group.usage.add(numeric(table, row, "usage"));
        if group.first_num_of_rows.is_none() {
            group.first_num_of_rows = non_empty(table, row, "num_of_rows");
        }
        if group.first_usage.is_none() {
            group.first_usage = non_empty(table, row, "usage");
        }
    }

    groups
        .into_iter()
        .map(|(key, group)| AggregatedStat {
            key,
            mean_search_time: group.search_time.rounded(4),
            mean_target_rank: group.target_rank.rounded(1),
            mean_usage: group.usage.rounded(1),
            count: group.count,
            first_num_of_rows: group.first_num_of_rows,
            first_usage: group.first_usage,
        })
        .collect()
}

/// Aggregate records that have not been persisted
#[inline]
pub fn aggregate_records(records: &[MeasurementRecord]) -> Vec<AggregatedStat> {
    let mut table = CsvTable::default();
    for row in records.iter().flat_map(MeasurementRecord::rows) {
        table.push_row(&row);
    }
    aggregate(&table)
}

#[inline]
pub fn aggregate_file(path: &Path) -> Result<Vec<AggregatedStat>> {
    let table = CsvTable::read(path)?.ok_or_else(|| {
        AnnError::Persistence(format!("measurement file {} not found", path.display()))
    })?;
    Ok(aggregate(&table))
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}.csv", stem, suffix))
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write the per-row and per-configuration summary files next to `input`
///
/// `<stem>_with_averages.csv` repeats every row with its group averages
/// appended; `<stem>_with_averages_one.csv` holds one row per configuration.
/// The input file is never modified.
#[inline]
pub fn write_summaries(input: &Path) -> Result<(PathBuf, PathBuf)> {
    let table = CsvTable::read(input)?.ok_or_else(|| {
        AnnError::Persistence(format!("measurement file {} not found", input.display()))
    })?;
    let stats = aggregate(&table);
    let by_key: BTreeMap<&ConfigKey, &AggregatedStat> =
        stats.iter().map(|stat| (&stat.key, stat)).collect();

    let mut with_averages = table.clone();
    for column in ["avg_search_time", "avg_target_rank", "avg_usage"] {
        if with_averages.column(column).is_none() {
            with_averages.headers.push(column.to_string());
        }
    }
    let width = with_averages.headers.len();
    let positions = [
        with_averages.column("avg_search_time"),
        with_averages.column("avg_target_rank"),
        with_averages.column("avg_usage"),
    ];
    for (row_index, row) in with_averages.rows.iter_mut().enumerate() {
        row.resize(width, String::new());
        let key = ConfigKey::of_row(&table, row_index);
        let Some(stat) = by_key.get(&key) else {
            continue;
        };
        let values = [
            stat.mean_search_time,
            stat.mean_target_rank,
            stat.mean_usage,
        ];
        for (position, value) in positions.iter().zip(values) {
            if let Some(position) = position {
                row[*position] = cell(value);
            }
        }
    }

    let mut summary = CsvTable::with_headers(
        CONFIG_COLUMNS.iter().copied().chain([
            "num_of_rows",
            "usage",
            "avg_search_time",
            "avg_target_rank",
            "avg_usage",
            "count",
        ]),
    );
    for stat in &stats {
        let mut row: Vec<(String, String)> = stat
            .key
            .pairs()
            .map(|(column, value)| (column.to_string(), value.to_string()))
            .collect();
        row.extend([
            (
                "num_of_rows".to_string(),
                stat.first_num_of_rows.clone().unwrap_or_default(),
            ),
            (
                "usage".to_string(),
                stat.first_usage.clone().unwrap_or_default(),
            ),
            ("avg_search_time".to_string(), cell(stat.mean_search_time)),
            ("avg_target_rank".to_string(), cell(stat.mean_target_rank)),
            ("avg_usage".to_string(), cell(stat.mean_usage)),
            ("count".to_string(), stat.count.to_string()),
        ]);
        summary.push_row(&row);
    }

    let per_row_path = sibling(input, "_with_averages");
    let summary_path = sibling(input, "_with_averages_one");
    with_averages.write(&per_row_path)?;
    summary.write(&summary_path)?;

    info!(
        "Aggregated {} rows of {} into {} configurations",
        table.rows.len(),
        input.display(),
        stats.len()
    );

    Ok((per_row_path, summary_path))
}
