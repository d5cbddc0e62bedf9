use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::model::EventRecord;

pub const COLUMNS: [&str; 4] = ["entity_name", "venue_name", "venue_address", "event_date"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no concert data to export")]
    NoData,

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// `concerts_YYYYmmdd_HHMMSS.csv`
pub fn default_filename(now: DateTime<Local>) -> String {
    format!("concerts_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// Header plus one row per record, in the order given.
pub fn write_records<W: Write>(out: W, records: &[EventRecord]) -> Result<(), ExportError> {
    if records.is_empty() {
        return Err(ExportError::NoData);
    }
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(COLUMNS)?;
    for r in records {
        wtr.write_record([r.entity_name(), r.venue_name(), r.venue_address(), r.event_date()])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn to_csv(records: &[EventRecord]) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_records(&mut buf, records)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Nothing is created on disk when there is nothing to write.
pub fn write_file(path: &Path, records: &[EventRecord]) -> Result<(), ExportError> {
    save_csv(path, &to_csv(records)?)
}

/// Write already rendered CSV, creating missing parent directories.
pub fn save_csv(path: &Path, csv: &str) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)?.write_all(csv.as_bytes())?;
    Ok(())
}
