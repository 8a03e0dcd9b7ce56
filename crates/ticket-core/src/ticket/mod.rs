//! Receipt field extraction module.

pub mod batch;
pub mod fallback;
mod reader;
pub mod rules;
pub mod validate;

pub use batch::{CommitReport, LedgerRow, LedgerSink, TicketBatch};
pub use fallback::{
    merge_fallback, parse_fallback_response, FallbackExtractor, StructuredExtractionService,
    SYSTEM_INSTRUCTION,
};
pub use reader::TicketReader;
pub use rules::{is_card_slip, normalize_text, ExtractionMatch, FieldExtractor};
pub use validate::{parse_amount, parse_amount_decimal, validate_fields, Verdict};

use rust_decimal::Decimal;

use crate::models::record::ExtractionRecord;

/// Sum of the amounts of valid records.
pub fn total<'a>(records: impl IntoIterator<Item = &'a ExtractionRecord>) -> Decimal {
    records
        .into_iter()
        .filter(|r| r.is_valid())
        .filter_map(|r| r.amount().and_then(parse_amount_decimal))
        .sum()
}
