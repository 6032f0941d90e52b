use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::{CsvTable, MeasurementRecord, Window};
use crate::{AnnError, Result};

/// Append a record's rows to a measurement file
///
/// The file is read, extended and rewritten. Two processes appending to the
/// same file can lose rows; use [`MeasurementWriter`] inside one process.
#[inline]
pub fn append_record(path: &Path, record: &MeasurementRecord) -> Result<usize> {
    CsvTable::append_to_file(path, &record.rows())
}

/// Serializes measurement appends within the process
#[derive(Debug, Clone)]
pub struct MeasurementWriter {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl MeasurementWriter {
    #[inline]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub async fn append(&self, file_name: &str, record: MeasurementRecord) -> Result<usize> {
        let path = self.dir.join(file_name);
        let _guard = self.lock.lock().await;

        let written = path.clone();
        let rows = tokio::task::spawn_blocking(move || append_record(&written, &record))
            .await
            .map_err(|e| AnnError::Persistence(format!("append task failed: {}", e)))??;

        debug!("{} now holds {} rows", path.display(), rows);
        Ok(rows)
    }

    /// Append one record per window to `<window>[_<category>].csv`
    #[inline]
    pub async fn append_windows(
        &self,
        records: Vec<(Window, MeasurementRecord)>,
        category: Option<&str>,
    ) -> Result<()> {
        for (window, record) in records {
            self.append(&window.file_name(category), record).await?;
        }
        Ok(())
    }
}
