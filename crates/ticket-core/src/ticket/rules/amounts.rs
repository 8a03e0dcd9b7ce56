//! Amount extraction for card-payment slips.

use super::patterns::{AMOUNT_KEYWORD, CURRENCY_KEYWORD};
use super::{ExtractionMatch, FieldExtractor};

/// Amount field extractor.
///
/// Operates on normalized text: the amount is whatever sits between the
/// `montant` keyword and the next `eur`. Format checks are left to validation.
pub struct AmountExtractor;

impl AmountExtractor {
    pub fn new() -> Self {
        Self
    }

    fn region_after(&self, text: &str, from: usize) -> Option<ExtractionMatch<String>> {
        let keyword_start = from + text.get(from..)?.find(AMOUNT_KEYWORD)?;
        let start = keyword_start + AMOUNT_KEYWORD.len();
        let end = start + text.get(start..)?.find(CURRENCY_KEYWORD)?;
        let region = &text[start..end];

        Some(
            ExtractionMatch::new(region.to_string(), &text[keyword_start..end + CURRENCY_KEYWORD.len()])
                .with_position(start, end),
        )
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for AmountExtractor {
    type Output = ExtractionMatch<String>;

    /// Uses the first `montant` only; a missing `eur` after it is a miss.
    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.region_after(text, 0)
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();
        let mut from = 0;

        while let Some(found) = self.region_after(text, from) {
            from = found
                .position
                .map(|(_, end)| end + CURRENCY_KEYWORD.len())
                .unwrap_or(text.len());
            results.push(found);
        }

        results
    }
}
