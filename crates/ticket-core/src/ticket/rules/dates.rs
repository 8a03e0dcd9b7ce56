//! Date extraction for receipts.

use chrono::NaiveDate;
use tracing::debug;

use super::patterns::DATE_PATTERN;
use super::{ExtractionMatch, FieldExtractor};

/// Date field extractor.
///
/// Operates on the raw transcript so the originating line can be reported.
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    /// Only the first date-like substring is considered. If it is not a real
    /// calendar date, nothing is returned.
    fn extract(&self, text: &str) -> Option<Self::Output> {
        let caps = DATE_PATTERN.captures(text)?;
        let full_match = caps.get(0)?;

        let Some(date) = parse_ticket_date(&caps[1], &caps[2], &caps[3]) else {
            debug!("Ignoring impossible date {:?}", full_match.as_str());
            return None;
        };

        Some(
            ExtractionMatch::new(date, full_match.as_str())
                .with_position(full_match.start(), full_match.end())
                .with_line(line_containing(text, full_match.as_str())),
        )
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        DATE_PATTERN
            .captures_iter(text)
            .filter_map(|caps| {
                let full_match = caps.get(0)?;
                let date = parse_ticket_date(&caps[1], &caps[2], &caps[3])?;
                Some(
                    ExtractionMatch::new(date, full_match.as_str())
                        .with_position(full_match.start(), full_match.end())
                        .with_line(line_of_offset(text, full_match.start())),
                )
            })
            .collect()
    }
}

/// Build a date from its day, month, and year tokens.
///
/// Two-digit years follow the POSIX pivot (69-99 -> 1900s, 00-68 -> 2000s);
/// any other year width except four digits is rejected.
pub fn parse_ticket_date(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let year: i32 = match year.len() {
        2 => expand_two_digit_year(year.parse().ok()?),
        4 => year.parse().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a whole `dd/mm/yy` or `dd/mm/yyyy` string.
pub fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let caps = DATE_PATTERN.captures(s.trim())?;
    if caps.get(0)?.as_str() != s.trim() {
        return None;
    }
    parse_ticket_date(&caps[1], &caps[2], &caps[3])
}

/// Canonical `dd/mm/yyyy` rendering.
pub fn format_ticket_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn expand_two_digit_year(year: i32) -> i32 {
    if year < 69 {
        2000 + year
    } else {
        1900 + year
    }
}

/// First line, scanning from the top, that contains `needle`.
fn line_containing(text: &str, needle: &str) -> Option<usize> {
    text.lines().position(|line| line.contains(needle))
}

fn line_of_offset(text: &str, offset: usize) -> Option<usize> {
    text.get(..offset).map(|before| before.matches('\n').count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_two_digit_year() {
        let extractor = DateExtractor::new();

        let result = extractor.extract("LE 12/04/23 A 10:45").unwrap();
        assert_eq!(result.value, NaiveDate::from_ymd_opt(2023, 4, 12).unwrap());
        assert_eq!(format_ticket_date(result.value), "12/04/2023");
        assert_eq!(result.source, "12/04/23");
        assert_eq!(result.position, Some((3, 11)));
    }

    #[test]
    fn test_four_digit_year_and_dash() {
        let extractor = DateExtractor::new();

        let result = extractor.extract("1-2-2024").unwrap();
        assert_eq!(result.value, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());

        let result = extractor.extract("05/11/1999").unwrap();
        assert_eq!(format_ticket_date(result.value), "05/11/1999");
    }

    #[test]
    fn test_posix_year_pivot() {
        assert_eq!(
            parse_ticket_date("01", "01", "68"),
            NaiveDate::from_ymd_opt(2068, 1, 1)
        );
        assert_eq!(
            parse_ticket_date("01", "01", "69"),
            NaiveDate::from_ymd_opt(1969, 1, 1)
        );
        assert_eq!(parse_ticket_date("01", "01", "123"), None);
    }

    #[test]
    fn test_line_index() {
        let text = "CARTE BANCAIRE\nTICKET CLIENT\n12/04/23 10:45\nSUPERMARCHE ACME";
        let result = DateExtractor::new().extract(text).unwrap();
        assert_eq!(result.line, Some(2));
    }

    #[test]
    fn test_only_first_match_is_used() {
        let text = "TEL 01/02/99\nLE 12/04/23";
        let result = DateExtractor::new().extract(text).unwrap();
        assert_eq!(result.value, NaiveDate::from_ymd_opt(1999, 2, 1).unwrap());
        assert_eq!(result.line, Some(0));

        let all = DateExtractor::new().extract_all(text);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].line, Some(1));
    }

    #[test]
    fn test_impossible_first_date_is_not_found() {
        let text = "REF 45/13/23\nLE 12/04/23";
        assert!(DateExtractor::new().extract(text).is_none());
    }

    #[test]
    fn test_no_date() {
        assert!(DateExtractor::new().extract("MERCI DE VOTRE VISITE").is_none());
    }

    #[test]
    fn test_canonical_round_trip() {
        for (raw, expected) in [
            ("12/04/23", NaiveDate::from_ymd_opt(2023, 4, 12)),
            ("3/7/2021", NaiveDate::from_ymd_opt(2021, 7, 3)),
            ("31/12/99", NaiveDate::from_ymd_opt(1999, 12, 31)),
        ] {
            let date = parse_date_str(raw).unwrap();
            assert_eq!(Some(date), expected);
            assert_eq!(parse_date_str(&format_ticket_date(date)), expected);
        }
    }

    #[test]
    fn test_parse_date_str_requires_whole_string() {
        assert!(parse_date_str("le 12/04/23").is_none());
        assert!(parse_date_str("12/04/23").is_some());
    }
}
