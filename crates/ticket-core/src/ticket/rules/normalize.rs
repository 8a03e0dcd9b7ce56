//! Canonical keyword-search form of an OCR transcript.

use deunicode::deunicode_char;

use super::patterns::CARD_SLIP_MARKERS;

/// Reduce a transcript to lowercase ASCII letters, digits, and decimal separators.
///
/// Letters are transliterated (`é` -> `e`, `œ` -> `oe`) and lowercased, digits
/// are kept, a `,` or `.` is kept unless the previous kept character is the same
/// separator, and everything else is dropped. Line structure is lost.
pub fn normalize_text(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());

    for c in raw.chars() {
        if c.is_alphabetic() {
            if let Some(ascii) = deunicode_char(c) {
                normalized.extend(
                    ascii
                        .chars()
                        .filter(|a| a.is_ascii_alphanumeric())
                        .map(|a| a.to_ascii_lowercase()),
                );
            }
        } else if c.is_ascii_digit() {
            normalized.push(c);
        } else if (c == ',' || c == '.') && !normalized.ends_with(c) {
            normalized.push(c);
        }
    }

    normalized
}

/// Whether normalized text reads like a payment-card slip.
pub fn is_card_slip(normalized: &str) -> bool {
    CARD_SLIP_MARKERS
        .iter()
        .any(|marker| normalized.contains(marker))
}
