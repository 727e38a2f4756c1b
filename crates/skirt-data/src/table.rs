//! Whitespace-delimited particle tables with comment headers.
//!
//! SKIRT imports particle sources and media from plain-text tables where each
//! column is announced by a `# column N: name (unit)` line. The writer emits
//! that header followed by one `%.8e`-formatted row per particle; the reader
//! streams rows back, skipping blanks and comments.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use crate::error::DataError;

/// A table column: name plus the unit SKIRT should attach to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub unit: &'static str,
}

impl Column {
    pub const fn new(name: &'static str, unit: &'static str) -> Self {
        Self { name, unit }
    }
}

/// Columns of the stellar source table.
pub const STAR_COLUMNS: [Column; 7] = [
    Column::new("x", "kpc"),
    Column::new("y", "kpc"),
    Column::new("z", "kpc"),
    Column::new("hsml", "kpc"),
    Column::new("Minit", "Msun"),
    Column::new("Z", "1"),
    Column::new("age", "Gyr"),
];

/// Columns of the gas/dust medium table.
pub const GAS_COLUMNS: [Column; 6] = [
    Column::new("x", "kpc"),
    Column::new("y", "kpc"),
    Column::new("z", "kpc"),
    Column::new("hsml", "kpc"),
    Column::new("Mgas", "Msun"),
    Column::new("Z", "1"),
];

/// Buffered writer for a particle table.
pub struct TableWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    columns: usize,
    rows_written: u64,
}

impl TableWriter {
    /// Creates the file and writes the column header.
    pub fn create(path: &Path, columns: &[Column]) -> Result<Self, DataError> {
        let file = File::create(path).map_err(|e| DataError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        for (i, col) in columns.iter().enumerate() {
            writeln!(writer, "# column {}: {} ({})", i + 1, col.name, col.unit)
                .map_err(|e| DataError::io(path, e))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            columns: columns.len(),
            rows_written: 0,
        })
    }

    /// Writes one particle row in `%.8e` format.
    ///
    /// The row length must match the header; a mismatch is a programming
    /// error upstream and panics in debug builds only.
    pub fn write_row(&mut self, row: &[f64]) -> Result<(), DataError> {
        debug_assert_eq!(row.len(), self.columns);
        let mut line = String::with_capacity(16 * row.len());
        for (i, v) in row.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(&format_e8(*v));
        }
        writeln!(self.writer, "{}", line).map_err(|e| DataError::io(&self.path, e))?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flushes buffered rows to disk.
    pub fn finish(mut self) -> Result<u64, DataError> {
        self.writer
            .flush()
            .map_err(|e| DataError::io(&self.path, e))?;
        Ok(self.rows_written)
    }

    /// Number of rows written so far.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

/// Formats a value like printf `%.8e`: two-digit signed exponent.
fn format_e8(v: f64) -> String {
    let s = format!("{:.8e}", v);
    // Rust renders `1.00000000e2`; normalize to `1.00000000e+02`.
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => s,
    }
}

/// Streaming reader over the numeric rows of a particle table.
pub struct TableReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl TableReader {
    /// Opens a table for streaming.
    pub fn open(path: &Path) -> Result<Self, DataError> {
        let file = File::open(path).map_err(|e| DataError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }

    /// Returns the next data row, or `None` at end of file.
    ///
    /// Blank lines and `#` comments are skipped.
    pub fn next_row(&mut self) -> Result<Option<Vec<f64>>, DataError> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line.map_err(|e| DataError::io(&self.path, e))?,
                None => return Ok(None),
            };
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut row = Vec::new();
            for field in trimmed.split_ascii_whitespace() {
                let v = field.parse::<f64>().map_err(|_| DataError::BadNumber {
                    path: self.path.clone(),
                    line: self.line_no,
                    value: field.to_string(),
                })?;
                row.push(v);
            }
            return Ok(Some(row));
        }
    }

    /// Reads all remaining rows into memory.
    pub fn read_all(mut self) -> Result<Vec<Vec<f64>>, DataError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }
}
