use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::Record;

const FULL_HEADER: [&str; 8] = [
    "Business Name",
    "Rating",
    "Review Count",
    "Category",
    "Address",
    "Phone",
    "Website",
    "Business Hours",
];

const COMPACT_HEADER: [&str; 6] = [
    "Business Name",
    "Category",
    "Address",
    "Phone",
    "Website",
    "Business Hours",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export")]
    Empty,
    #[error("could not write export: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode export: {0}")]
    Csv(#[from] csv::Error),
}

/// Which column layout to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Columns {
    #[default]
    Full,
    /// Drops rating and review count.
    Compact,
}

impl Columns {
    pub fn header(self) -> &'static [&'static str] {
        match self {
            Columns::Full => &FULL_HEADER,
            Columns::Compact => &COMPACT_HEADER,
        }
    }

    fn row(self, r: &Record) -> Vec<&str> {
        match self {
            Columns::Full => vec![
                r.name.as_str(),
                r.rating.as_str(),
                r.review_count.as_str(),
                r.category.as_str(),
                r.address.as_str(),
                r.phone.as_str(),
                r.website.as_str(),
                r.hours.as_str(),
            ],
            Columns::Compact => vec![
                r.name.as_str(),
                r.category.as_str(),
                r.address.as_str(),
                r.phone.as_str(),
                r.website.as_str(),
                r.hours.as_str(),
            ],
        }
    }
}

/// Persists one batch item's (or one run's) records.
pub trait Exporter: Send + Sync {
    fn export(&self, term: Option<&str>, records: &[Record]) -> Result<PathBuf, ExportError>;
}

/// Writes records as comma-delimited text. Fields holding a comma, quote or
/// line break are quoted with inner quotes doubled.
pub fn write_csv<W: Write>(writer: W, records: &[Record], columns: Columns) -> Result<(), ExportError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    csv_writer.write_record(columns.header())?;
    for record in records {
        csv_writer.write_record(columns.row(record))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn to_csv_string(records: &[Record], columns: Columns) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_csv(&mut buf, records, columns)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Every non-alphanumeric character becomes `_`.
pub fn sanitize_term(term: &str) -> String {
    term.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// `{term or "export"}_{YYYYMMDD}_{epoch ms}.csv`
pub fn export_filename(term: Option<&str>, now: DateTime<Utc>) -> String {
    let stem = match term {
        Some(t) if !t.is_empty() => sanitize_term(t),
        _ => "export".to_string(),
    };
    format!("{}_{}_{}.csv", stem, now.format("%Y%m%d"), now.timestamp_millis())
}

pub struct CsvExporter {
    out_dir: PathBuf,
    columns: Columns,
}

impl CsvExporter {
    pub fn new<P: Into<PathBuf>>(out_dir: P, columns: Columns) -> Self {
        CsvExporter {
            out_dir: out_dir.into(),
            columns,
        }
    }
}

impl Exporter for CsvExporter {
    fn export(&self, term: Option<&str>, records: &[Record]) -> Result<PathBuf, ExportError> {
        if records.is_empty() {
            return Err(ExportError::Empty);
        }
        fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(export_filename(term, Utc::now()));
        let file = File::create(&path)?;
        write_csv(file, records, self.columns)?;
        info!("Exported {} businesses to {:?}", records.len(), path);
        Ok(path)
    }
}
