//! Rolling CSV logs for efficacy, load, and DER rows.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::report::{ReportRow, TimestepReport};

/// First column of every log.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row has {actual} cells but the log has {expected} section columns")]
    ColumnMismatch { expected: usize, actual: usize },
}

/// The three per-simulation logs, kept open for appending.
///
/// Files are named `efficacy<id>.csv`, `load<id>.csv`, and `der<id>.csv`.
/// Each is truncated and given its header on creation; every appended row
/// is flushed immediately so the files can be followed while the
/// simulation runs.
pub struct CsvLogs {
    efficacy: csv::Writer<File>,
    load: csv::Writer<File>,
    der: csv::Writer<File>,
    sections: usize,
    paths: [PathBuf; 3],
}

impl CsvLogs {
    /// Creates the three logs in `dir` and writes their headers.
    ///
    /// # Arguments
    ///
    /// * `dir` - Output directory, created if missing
    /// * `simulation_id` - Suffix of the three file names
    /// * `sections` - Section column names, in order
    ///
    /// # Returns
    ///
    /// The open logs, each holding only its header.
    ///
    /// # Errors
    ///
    /// Returns an `ExportError` if the directory or a file cannot be created.
    pub fn create(dir: &Path, simulation_id: &str, sections: &[String]) -> Result<Self, ExportError> {
        fs::create_dir_all(dir).map_err(|source| ExportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let paths = ["efficacy", "load", "der"].map(|kind| dir.join(format!("{kind}{simulation_id}.csv")));
        let [efficacy, load, der] = [&paths[0], &paths[1], &paths[2]].map(|path| open_log(path, sections));

        let logs = Self {
            efficacy: efficacy?,
            load: load?,
            der: der?,
            sections: sections.len(),
            paths,
        };
        info!(
            dir = %dir.display(),
            %simulation_id,
            sections = logs.sections,
            "created csv logs"
        );
        Ok(logs)
    }

    /// Appends one row to each log and flushes it.
    ///
    /// All three rows are checked and rendered before any file is touched.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::ColumnMismatch` if a row does not match the
    /// header, or a write error.
    pub fn append(&mut self, report: &TimestepReport) -> Result<(), ExportError> {
        for row in [&report.efficacy, &report.load, &report.der] {
            check_width(row, self.sections)?;
        }
        let [efficacy, load, der] =
            [&report.efficacy, &report.load, &report.der].map(|row| record(&report.date_time, row));
        append_record(&mut self.efficacy, &efficacy)?;
        append_record(&mut self.load, &load)?;
        append_record(&mut self.der, &der)?;
        Ok(())
    }

    /// Paths of the efficacy, load, and der logs.
    pub fn paths(&self) -> &[PathBuf; 3] {
        &self.paths
    }
}

fn open_log(path: &Path, sections: &[String]) -> Result<csv::Writer<File>, ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    write_header(&mut wtr, sections)?;
    wtr.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(wtr)
}

fn check_width(row: &ReportRow, expected: usize) -> Result<(), ExportError> {
    if row.cells.len() == expected {
        Ok(())
    } else {
        Err(ExportError::ColumnMismatch {
            expected,
            actual: row.cells.len(),
        })
    }
}

fn record(date_time: &str, row: &ReportRow) -> Vec<String> {
    let mut record = Vec::with_capacity(row.cells.len() + 1);
    record.push(date_time.to_string());
    record.extend(row.cells.iter().map(|cell| format_cell(*cell)));
    record
}

fn append_record<W: Write>(wtr: &mut csv::Writer<W>, record: &[String]) -> Result<(), ExportError> {
    wtr.write_record(record)?;
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Writes the `timestamp,<section>...` header.
pub fn write_header<W: Write>(
    wtr: &mut csv::Writer<W>,
    sections: &[String],
) -> Result<(), ExportError> {
    wtr.write_record(std::iter::once(TIMESTAMP_COLUMN).chain(sections.iter().map(String::as_str)))?;
    Ok(())
}

/// Writes one data row.
pub fn write_row<W: Write>(
    wtr: &mut csv::Writer<W>,
    date_time: &str,
    row: &ReportRow,
) -> Result<(), ExportError> {
    wtr.write_record(record(date_time, row))?;
    Ok(())
}

/// Writes a header followed by `rows` to any writer.
///
/// # Errors
///
/// Returns an `ExportError` if a row does not match the header or writing fails.
pub fn write_rows<W: Write>(
    writer: W,
    sections: &[String],
    rows: &[(String, ReportRow)],
) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    write_header(&mut wtr, sections)?;
    for (date_time, row) in rows {
        check_width(row, sections.len())?;
        write_row(&mut wtr, date_time, row)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Renders a cell the way the platform's Python tooling prints floats.
///
/// Whole numbers keep a `.0` and magnitudes outside `1e-4..1e16` use an
/// exponent with a sign and at least two digits. A missing value is empty.
pub fn format_cell(cell: Option<f64>) -> String {
    cell.map(format_float).unwrap_or_default()
}

fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    // `{:e}` gives the shortest round-trip digits, e.g. `1.5e-5`.
    let scientific = format!("{v:e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if v != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs());
    }
    let plain = v.to_string();
    if plain.contains('.') { plain } else { format!("{plain}.0") }
}
