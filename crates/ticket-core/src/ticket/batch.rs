//! Batch of records awaiting persistence.

use tracing::{debug, info, warn};

use crate::error::{ExtractionError, LedgerError, ServiceError};
use crate::models::record::{ExtractionRecord, Field};

use super::reader::TicketReader;

/// Append-only row store for accepted records.
///
/// Row numbers are 1-based, as in a spreadsheet.
pub trait LedgerSink {
    /// First free row.
    fn next_row(&mut self) -> Result<u32, ServiceError>;

    /// Write one entry at `row`.
    fn write_row(&mut self, row: u32, entry: &LedgerRow) -> Result<(), ServiceError>;
}

impl<S: LedgerSink + ?Sized> LedgerSink for &mut S {
    fn next_row(&mut self) -> Result<u32, ServiceError> {
        (**self).next_row()
    }

    fn write_row(&mut self, row: u32, entry: &LedgerRow) -> Result<(), ServiceError> {
        (**self).write_row(row, entry)
    }
}

impl<S: LedgerSink + ?Sized> LedgerSink for Box<S> {
    fn next_row(&mut self) -> Result<u32, ServiceError> {
        (**self).next_row()
    }

    fn write_row(&mut self, row: u32, entry: &LedgerRow) -> Result<(), ServiceError> {
        (**self).write_row(row, entry)
    }
}

/// The persisted part of a valid record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub date: String,
    pub label: String,
    pub amount: String,
}

impl LedgerRow {
    /// Row for a record; fails unless the record is valid.
    pub fn from_record(record: &ExtractionRecord) -> Result<Self, ExtractionError> {
        match (record.date(), record.label(), record.amount()) {
            (Some(date), Some(label), Some(amount)) if record.is_valid() => Ok(Self {
                date: date.to_string(),
                label: label.to_string(),
                amount: amount.to_string(),
            }),
            _ => Err(ExtractionError::ValidationFailed {
                fields: record.invalid_fields(),
            }),
        }
    }

    /// Spreadsheet cells A..F for this entry at `row`.
    ///
    /// Column F carries the running balance: previous balance minus this amount.
    /// The first row of a sheet has no previous balance to refer to.
    pub fn cells(&self, row: u32) -> [String; 6] {
        let balance = if row <= 1 {
            format!("=-D{}", row)
        } else {
            format!("=F{} - D{}", row - 1, row)
        };
        [
            self.date.clone(),
            self.label.clone(),
            String::new(),
            self.amount.clone(),
            String::new(),
            balance,
        ]
    }
}

/// Outcome of a successful commit.
#[derive(Debug)]
pub struct CommitReport {
    /// Records written, in order.
    pub committed: Vec<ExtractionRecord>,
    /// Row of the first written record.
    pub first_row: u32,
    /// First free row after the commit.
    pub next_row: u32,
}

/// Records of one processing run.
#[derive(Debug, Default)]
pub struct TicketBatch {
    records: Vec<ExtractionRecord>,
}

impl TicketBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ExtractionRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ExtractionRecord] {
        &self.records
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ExtractionRecord> {
        self.records.get_mut(index)
    }

    /// Take a record out of the batch.
    pub fn remove(&mut self, index: usize) -> Option<ExtractionRecord> {
        (index < self.records.len()).then(|| self.records.remove(index))
    }

    /// Valid records, in order.
    pub fn accepted(&self) -> impl Iterator<Item = &ExtractionRecord> {
        self.records.iter().filter(|r| r.is_valid())
    }

    /// Indices of records awaiting manual correction.
    pub fn correction_queue(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_valid())
            .map(|(i, _)| i)
            .collect()
    }

    /// Fields failing across the correction queue.
    pub fn failing_fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        for record in self.records.iter().filter(|r| !r.is_valid()) {
            for field in record.invalid_fields() {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }

    /// Switch fallback mode on every queued record and re-run its fallback path.
    pub fn set_fallback_mode(&mut self, reader: &TicketReader, enabled: bool) {
        for index in self.correction_queue() {
            reader.set_fallback_mode(&mut self.records[index], enabled);
        }
    }

    /// Write every record to the sink, in order.
    ///
    /// Refuses while any record needs correction. The first free row is read
    /// once, then advanced locally after each successful write. On a failed
    /// write the records already written leave the batch and the rest stay.
    pub fn commit(&mut self, sink: &mut impl LedgerSink) -> Result<CommitReport, LedgerError> {
        let pending = self.correction_queue().len();
        if pending > 0 {
            warn!(pending, fields = ?self.failing_fields(), "Refusing to commit batch");
            return Err(LedgerError::PendingCorrections { pending });
        }

        let rows = self
            .records
            .iter()
            .map(LedgerRow::from_record)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| LedgerError::PendingCorrections {
                pending: self.records.len(),
            })?;

        let first_row = sink.next_row()?;
        let mut row = first_row;
        debug!(first_row, count = rows.len(), "Committing batch");

        for (written, entry) in rows.iter().enumerate() {
            if let Err(source) = sink.write_row(row, entry) {
                warn!(row, error = %source, "Ledger write failed");
                self.records.drain(..written);
                return Err(LedgerError::Partial {
                    committed: written,
                    source,
                });
            }
            row += 1;
        }

        info!(count = rows.len(), first_row, "Batch committed");
        Ok(CommitReport {
            committed: std::mem::take(&mut self.records),
            first_row,
            next_row: row,
        })
    }
}

impl Extend<ExtractionRecord> for TicketBatch {
    fn extend<I: IntoIterator<Item = ExtractionRecord>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

impl FromIterator<ExtractionRecord> for TicketBatch {
    fn from_iter<I: IntoIterator<Item = ExtractionRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::CorrectionDraft;
    use pretty_assertions::assert_eq;

    /// In-memory sink that can be told to fail at a given row.
    #[derive(Default)]
    struct MemorySink {
        existing_rows: u32,
        rows: Vec<(u32, [String; 6])>,
        fail_at: Option<u32>,
        cursor_reads: u32,
    }

    impl LedgerSink for MemorySink {
        fn next_row(&mut self) -> Result<u32, ServiceError> {
            self.cursor_reads += 1;
            Ok(self.existing_rows + self.rows.len() as u32 + 1)
        }

        fn write_row(&mut self, row: u32, entry: &LedgerRow) -> Result<(), ServiceError> {
            if self.fail_at == Some(row) {
                return Err(ServiceError::Unavailable {
                    service: "memory",
                    attempts: 2,
                    reason: "disk full".to_string(),
                });
            }
            self.rows.push((row, entry.cells(row)));
            Ok(())
        }
    }

    fn valid_record(name: &str, amount: &str) -> ExtractionRecord {
        let mut record = ExtractionRecord::new(name, "");
        record.commit_correction(CorrectionDraft {
            date: Some("12/04/2023".to_string()),
            label: Some(format!("CB {name}")),
            amount: Some(amount.to_string()),
        });
        assert!(record.is_valid());
        record
    }

    #[test]
    fn test_row_cells() {
        let row = LedgerRow {
            date: "12/04/2023".to_string(),
            label: "CB Acme".to_string(),
            amount: "15,99".to_string(),
        };
        assert_eq!(
            row.cells(7),
            [
                "12/04/2023".to_string(),
                "CB Acme".to_string(),
                String::new(),
                "15,99".to_string(),
                String::new(),
                "=F6 - D7".to_string(),
            ]
        );
    }

    #[test]
    fn test_first_sheet_row_has_no_previous_balance() {
        let row = LedgerRow {
            date: "12/04/2023".to_string(),
            label: "CB Acme".to_string(),
            amount: "15,99".to_string(),
        };
        assert_eq!(row.cells(1)[5], "=-D1");
        assert_eq!(row.cells(2)[5], "=F1 - D2");
    }

    #[test]
    fn test_commit_reads_cursor_once() {
        let mut batch: TicketBatch = vec![valid_record("a", "1,00"), valid_record("b", "2,50")]
            .into_iter()
            .collect();
        let mut sink = MemorySink {
            existing_rows: 4,
            ..Default::default()
        };

        let report = batch.commit(&mut sink).unwrap();

        assert_eq!(sink.cursor_reads, 1);
        assert_eq!(report.first_row, 5);
        assert_eq!(report.next_row, 7);
        assert_eq!(report.committed.len(), 2);
        assert_eq!(sink.rows.iter().map(|(r, _)| *r).collect::<Vec<_>>(), vec![5, 6]);
        assert_eq!(sink.rows[1].1[5], "=F5 - D6");
        assert!(batch.is_empty());
    }

    #[test]
    fn test_commit_refused_with_pending_corrections() {
        let mut batch = TicketBatch::new();
        batch.push(valid_record("a", "1,00"));
        batch.push(ExtractionRecord::new("b", "illisible"));
        let mut sink = MemorySink::default();

        let err = batch.commit(&mut sink).unwrap_err();

        assert!(matches!(err, LedgerError::PendingCorrections { pending: 1 }));
        assert_eq!(sink.cursor_reads, 0);
        assert!(sink.rows.is_empty());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.correction_queue(), vec![1]);
        assert_eq!(batch.accepted().map(|r| r.name()).collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(batch.failing_fields(), vec![Field::Date, Field::Label, Field::Amount]);

        let skipped = batch.remove(1).unwrap();
        assert_eq!(skipped.name(), "b");
        assert!(batch.remove(5).is_none());
        assert!(batch.commit(&mut sink).is_ok());
    }

    #[test]
    fn test_failed_write_keeps_unwritten_records() {
        let mut batch: TicketBatch = ["a", "b", "c"]
            .into_iter()
            .map(|name| valid_record(name, "3"))
            .collect();
        let mut sink = MemorySink {
            existing_rows: 1,
            fail_at: Some(3),
            ..Default::default()
        };

        let err = batch.commit(&mut sink).unwrap_err();

        assert!(matches!(err, LedgerError::Partial { committed: 1, .. }));
        assert_eq!(sink.rows.len(), 1);
        let left: Vec<_> = batch.records().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(left, vec!["b".to_string(), "c".to_string()]);

        sink.fail_at = None;
        let report = batch.commit(&mut sink).unwrap();
        assert_eq!(report.first_row, 3);
        assert_eq!(report.next_row, 5);
    }

    #[test]
    fn test_row_from_invalid_record() {
        let record = ExtractionRecord::new("a", "");
        assert!(matches!(
            LedgerRow::from_record(&record),
            Err(ExtractionError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_toggle_fallback_on_queue_only() {
        let reader = TicketReader::new();
        let mut batch = TicketBatch::new();
        batch.push(valid_record("a", "1"));
        batch.push(ExtractionRecord::new("b", "EPICERIE"));

        batch.set_fallback_mode(&reader, true);

        assert!(!batch.records()[0].uses_fallback());
        assert!(batch.records()[1].uses_fallback());
    }
}
