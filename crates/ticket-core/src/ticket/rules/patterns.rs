//! Patterns and keywords for receipt extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Day, month, 2-4 digit year; "/" or "-" separated
    pub static ref DATE_PATTERN: Regex = Regex::new(
        r"([0-9]{1,2})[/-]([0-9]{1,2})[/-]([0-9]{2,4})"
    ).unwrap();
}

/// Normalized keyword opening the amount region.
pub const AMOUNT_KEYWORD: &str = "montant";

/// Normalized keyword closing the amount region.
pub const CURRENCY_KEYWORD: &str = "eur";

/// Normalized markers of a payment-card slip.
pub const CARD_SLIP_MARKERS: [&str; 2] = ["cartebancaire", "creditcard"];
