//! Error types for the ticket-core library.

use std::time::Duration;

use thiserror::Error;

use crate::models::record::Field;

/// Main error type for the ticket library.
#[derive(Error, Debug)]
pub enum TicketError {
    /// Field extraction or validation error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// External service error (OCR, language model, spreadsheet).
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Persistence error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to receipt field extraction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// A heuristic could not locate its keyword or pattern.
    #[error("unable to read {0}")]
    FieldNotFound(Field),

    /// The structured-extraction reply did not match the expected schema.
    #[error("malformed fallback response: {reason}")]
    MalformedFallbackResponse { reason: String, raw: String },

    /// One or more fields failed their format checks.
    #[error("validation failed for {}", join_fields(.fields))]
    ValidationFailed { fields: Vec<Field> },
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised at the transport level by external collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The service could not be reached after every allowed attempt.
    #[error("{service} unavailable after {attempts} attempt(s): {reason}")]
    Unavailable {
        service: &'static str,
        attempts: u32,
        reason: String,
    },

    /// The service did not answer in time.
    #[error("{service} timed out after {after:?}")]
    Timeout {
        service: &'static str,
        after: Duration,
    },

    /// The service answered with a non-transient refusal.
    #[error("{service} rejected the request ({status}): {body}")]
    Rejected {
        service: &'static str,
        status: u16,
        body: String,
    },
}

impl ServiceError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

/// Errors from one structured-extraction attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FallbackError {
    /// Fallback was requested but no service is wired in.
    #[error("no structured-extraction service configured")]
    NotConfigured,

    /// The service could not be reached.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The reply could not be decoded.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Errors related to image preparation and transcription.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Image preprocessing failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The OCR engine ran but failed.
    #[error("recognition failed: {0}")]
    Recognition(String),

    /// The OCR engine could not be run.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Errors related to persisting accepted records.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The backing store failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The batch still holds records awaiting manual correction.
    #[error("{pending} record(s) still need correction")]
    PendingCorrections { pending: usize },

    /// A write failed after some rows were committed.
    #[error("write failed after {committed} committed row(s): {source}")]
    Partial {
        committed: usize,
        #[source]
        source: ServiceError,
    },
}

/// Result type for the ticket library.
pub type Result<T> = std::result::Result<T, TicketError>;
