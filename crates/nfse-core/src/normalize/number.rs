//! Locale-tolerant numeric parsing for XML field text.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::models::invoice::{ISS_NOT_WITHHELD, ISS_WITHHELD};

/// Parse a numeric field that may use either `,` or `.` as decimal separator.
///
/// When the text contains a comma, periods are thousands separators and the
/// first comma is the decimal point ("1.234,56"). Otherwise the text is
/// already period-decimal ("1234.56"). Whitespace anywhere is ignored.
///
/// Empty or unparseable input yields zero; this never fails. Only digits,
/// separators, signs and an exponent marker are accepted, so "1_000" is zero.
pub fn normalize_number(text: &str) -> Decimal {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Decimal::ZERO;
    }

    let normalized = if compact.contains(',') {
        compact.replace('.', "").replacen(',', ".", 1)
    } else {
        compact
    };

    if !normalized.chars().all(is_numeric_char) {
        return Decimal::ZERO;
    }

    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .unwrap_or(Decimal::ZERO)
}

fn is_numeric_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E')
}

/// Map an ISS withholding indicator to `1` (withheld) or `2` (anything else).
///
/// Accepts both the ABRASF `IssRetido` flag and the national `tpRetISSQN`
/// code, which share the "1 means withheld" reading here.
pub fn parse_iss_withholding(text: &str) -> u8 {
    if normalize_number(text) == Decimal::ONE {
        ISS_WITHHELD
    } else {
        ISS_NOT_WITHHELD
    }
}
