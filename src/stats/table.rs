use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::{AnnError, Result};

const BOM: char = '\u{feff}';

fn persistence(path: &Path, action: &str, error: impl std::fmt::Display) -> AnnError {
    AnnError::Persistence(format!("failed to {} {}: {}", action, path.display(), error))
}

/// A CSV file held in memory as a header row plus string cells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    #[inline]
    pub fn with_headers<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Read a table, `None` when the file does not exist
    #[inline]
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let file = fs::File::open(path).map_err(|e| persistence(path, "open", e))?;
        Self::from_reader(file)
            .map(Some)
            .map_err(|e| persistence(path, "read", e))
    }

    #[inline]
    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let mut headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if let Some(first) = headers.first_mut() {
            if first.starts_with(BOM) {
                *first = first.trim_start_matches(BOM).to_string();
            }
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }

        let mut table = Self { headers, rows };
        table.square();
        Ok(table)
    }

    /// Give every row the same width without dropping cells
    ///
    /// Cells past the last header get `column_<position>` headers.
    fn square(&mut self) {
        let widest = self.rows.iter().map(Vec::len).max().unwrap_or_default();
        while self.headers.len() < widest {
            let mut name = format!("column_{}", self.headers.len() + 1);
            while self.column(&name).is_some() {
                name.push('_');
            }
            self.headers.push(name);
        }

        let width = self.headers.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
    }

    #[inline]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    #[inline]
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column(column)?;
        self.rows.get(row)?.get(index).map(String::as_str)
    }

    /// Append a row given as (column, value) pairs
    ///
    /// Unknown columns are added after the existing ones and earlier rows are
    /// padded with empty cells. Columns the row lacks stay empty.
    #[inline]
    pub fn push_row(&mut self, cells: &[(String, String)]) {
        for (column, _) in cells {
            if self.column(column).is_none() {
                self.headers.push(column.clone());
            }
        }

        self.square();

        let mut row = vec![String::new(); self.headers.len()];
        for (column, value) in cells {
            if let Some(index) = self.column(column) {
                row[index] = value.clone();
            }
        }
        self.rows.push(row);
    }

    #[inline]
    pub fn to_writer<W: Write>(&self, writer: W) -> std::result::Result<(), csv::Error> {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the whole table, replacing the file through a sibling temp file
    #[inline]
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persistence(parent, "create", e))?;
        }

        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);

        let file = fs::File::create(&temp_path).map_err(|e| persistence(&temp_path, "create", e))?;
        self.to_writer(file)
            .map_err(|e| persistence(&temp_path, "write", e))?;
        fs::rename(&temp_path, path).map_err(|e| persistence(path, "replace", e))?;

        Ok(())
    }

    /// Read `path`, append rows and rewrite it, returning the new row count
    #[inline]
    pub fn append_to_file(path: &Path, rows: &[Vec<(String, String)>]) -> Result<usize> {
        let mut table = Self::read(path)?.unwrap_or_default();
        for row in rows {
            table.push_row(row);
        }
        table.write(path)?;
        Ok(table.rows.len())
    }
}
