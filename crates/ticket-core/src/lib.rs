//! Core library for reading French retail receipts.
//!
//! This crate provides:
//! - Text normalization and card-slip detection
//! - Rule-based date, amount and label extraction
//! - Structured-extraction fallback through a language-model service
//! - Field validation and manual correction of extraction records
//! - Batch persistence to a spreadsheet ledger
//! - Image preprocessing and Tesseract transcription

pub mod error;
pub mod models;
pub mod ocr;
pub mod services;
pub mod ticket;

pub use error::{ExtractionError, FallbackError, LedgerError, OcrError, Result, ServiceError, TicketError};
pub use models::config::{RetryPolicy, TicketConfig};
pub use models::record::{CorrectionDraft, ExtractionRecord, FallbackFields, Field, RecordStatus};
pub use ocr::{transcribe_file, ImagePreprocessor, ImageStage, OcrService, Passthrough};
#[cfg(feature = "native")]
pub use ocr::TesseractOcr;
#[cfg(feature = "native")]
pub use services::{ChatCompletionService, GoogleSheetsSink};
pub use ticket::{
    CommitReport, LedgerRow, LedgerSink, StructuredExtractionService, TicketBatch, TicketReader,
};
