//! Field well-formedness checks.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::models::record::Field;

use super::rules::patterns::DATE_PATTERN;

/// Per-field outcome of a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub date: bool,
    pub label: bool,
    pub amount: bool,
}

impl Verdict {
    /// Whether every field passed.
    pub fn all(&self) -> bool {
        self.date && self.label && self.amount
    }

    /// Fields that failed, in display order.
    pub fn failing(&self) -> Vec<Field> {
        [
            (Field::Date, self.date),
            (Field::Label, self.label),
            (Field::Amount, self.amount),
        ]
        .into_iter()
        .filter_map(|(field, ok)| (!ok).then_some(field))
        .collect()
    }
}

/// Check the three fields. Never fails, whatever the input.
pub fn validate_fields(date: Option<&str>, label: Option<&str>, amount: Option<&str>) -> Verdict {
    Verdict {
        date: date.is_some_and(is_valid_date),
        label: label.is_some_and(is_valid_label),
        amount: amount.is_some_and(|a| parse_amount(a).is_some()),
    }
}

/// A date is accepted when it contains a date-shaped token. Calendar
/// correctness is not checked here.
pub fn is_valid_date(date: &str) -> bool {
    DATE_PATTERN.is_match(date)
}

pub fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
}

/// Parse an amount written with a comma or a period as decimal separator.
pub fn parse_amount(amount: &str) -> Option<f64> {
    let value: f64 = amount.trim().replace(',', ".").parse().ok()?;
    value.is_finite().then_some(value)
}

/// Exact decimal value of an accepted amount, for totals.
pub fn parse_amount_decimal(amount: &str) -> Option<Decimal> {
    let normalized = amount.trim().replace(',', ".");
    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()
}
