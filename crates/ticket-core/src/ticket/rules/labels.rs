//! Label extraction for card-payment slips.

use chrono::NaiveDate;

use super::ExtractionMatch;

/// Marker prepended to labels of card payments.
pub const CARD_PAYMENT_PREFIX: &str = "CB ";

/// Label from the line following the detected date.
///
/// Card slips print the merchant right under the transaction date.
pub fn extract_label(source_text: &str, date: &ExtractionMatch<NaiveDate>) -> Option<String> {
    let line = source_text.lines().nth(date.line? + 1)?.trim();
    if line.is_empty() {
        return None;
    }
    Some(format!("{}{}", CARD_PAYMENT_PREFIX, capitalize(line)))
}

/// First character uppercase, the rest lowercase.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
