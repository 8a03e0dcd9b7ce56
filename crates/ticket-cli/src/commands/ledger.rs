//! Local CSV ledger for offline runs.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use tracing::debug;

use ticket_core::{LedgerRow, LedgerSink, ServiceError};

const SERVICE: &str = "csv ledger";
const HEADER: [&str; 6] = ["date", "label", "note", "amount", "note", "balance"];

/// Ledger kept in a CSV file laid out like the spreadsheet: one header row,
/// then one row per receipt.
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn unavailable(e: impl std::fmt::Display) -> ServiceError {
    ServiceError::Unavailable {
        service: SERVICE,
        attempts: 1,
        reason: e.to_string(),
    }
}

impl LedgerSink for CsvLedger {
    fn next_row(&mut self) -> Result<u32, ServiceError> {
        if !self.path.exists() {
            return Ok(2);
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .map_err(unavailable)?;
        let mut rows = 0u32;
        for record in reader.records() {
            record.map_err(unavailable)?;
            rows += 1;
        }
        Ok(rows + 2)
    }

    fn write_row(&mut self, row: u32, entry: &LedgerRow) -> Result<(), ServiceError> {
        let is_new = !self.path.exists();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(unavailable)?;
        }
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(unavailable)?;

        let mut wtr = csv::Writer::from_writer(file);
        if is_new {
            wtr.write_record(HEADER).map_err(unavailable)?;
        }
        wtr.write_record(entry.cells(row)).map_err(unavailable)?;
        wtr.flush().map_err(unavailable)?;

        debug!(row, path = %self.path.display(), "Appended ledger row");
        Ok(())
    }
}
