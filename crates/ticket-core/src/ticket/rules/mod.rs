//! Rule-based field extractors for French retail receipts.

pub mod amounts;
pub mod dates;
pub mod labels;
pub mod normalize;
pub mod patterns;

pub use amounts::AmountExtractor;
pub use dates::{format_ticket_date, parse_ticket_date, DateExtractor};
pub use labels::{capitalize, extract_label, CARD_PAYMENT_PREFIX};
pub use normalize::{is_card_slip, normalize_text};

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// A located field value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Byte range in the searched text.
    pub position: Option<(usize, usize)>,
    /// Zero-based line of the searched text holding the match.
    pub line: Option<usize>,
    /// Source text that was matched.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, source: impl Into<String>) -> Self {
        Self {
            value,
            position: None,
            line: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }

    pub fn with_line(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self
    }
}
