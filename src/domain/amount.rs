use std::fmt;

use super::Token;

/// Ledger amounts are signed integers in the token's base units.
/// With precision 4, 1 EOS = 10000 units, so 100.0000 EOS = 1000000.
pub type RawAmount = i64;

/// Render raw units as a fixed-point string with exactly `precision` fractional digits.
/// Example: (1000000, 4) -> "100.0000", (-5, 2) -> "-0.05", (42, 0) -> "42"
pub fn to_display(raw: RawAmount, precision: u8) -> String {
    let sign = if raw < 0 { "-" } else { "" };
    let digits = raw.unsigned_abs().to_string();
    let precision = precision as usize;

    if precision == 0 {
        return format!("{}{}", sign, digits);
    }

    let padded = format!("{:0>width$}", digits, width = precision + 1);
    let (units, fraction) = padded.split_at(padded.len() - precision);
    format!("{}{}.{}", sign, units, fraction)
}

/// Render raw units with the token name appended, e.g. "100.0000 EOS".
pub fn format_quantity(raw: RawAmount, token: &Token) -> String {
    format!("{} {}", to_display(raw, token.precision), token.name)
}

/// Parse a decimal string into raw units at the given precision.
/// Example: ("100.0000", 4) -> 1000000, ("12.5", 4) -> 125000, ("0.00005", 4) -> 1
///
/// Fraction digits beyond `precision` are rounded half away from zero.
pub fn to_raw(input: &str, precision: u8) -> Result<RawAmount, AmountError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AmountError::Empty);
    }

    let (negative, unsigned) = match input.as_bytes()[0] {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };

    let (units, fraction) = match unsigned.split_once('.') {
        Some((units, fraction)) => (units, fraction),
        None => (unsigned, ""),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (units.is_empty() && fraction.is_empty()) || !all_digits(units) || !all_digits(fraction)
    {
        return Err(AmountError::NotNumeric(input.to_string()));
    }

    let overflow = || AmountError::OutOfRange(input.to_string());
    let precision = precision as usize;

    // Accumulate the magnitude in i128 so i64::MIN's magnitude is representable.
    let mut magnitude: i128 = 0;
    let kept_fraction = fraction.bytes().chain(std::iter::repeat(b'0')).take(precision);
    for byte in units.bytes().chain(kept_fraction) {
        magnitude = magnitude
            .checked_mul(10)
            .and_then(|m| m.checked_add((byte - b'0') as i128))
            .ok_or_else(overflow)?;
    }

    if let Some(next) = fraction.as_bytes().get(precision) {
        if *next >= b'5' {
            magnitude = magnitude.checked_add(1).ok_or_else(overflow)?;
        }
    }

    let signed = if negative { -magnitude } else { magnitude };
    RawAmount::try_from(signed).map_err(|_| overflow())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    Empty,
    NotNumeric(String),
    OutOfRange(String),
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Empty => write!(f, "amount is empty"),
            AmountError::NotNumeric(s) => write!(f, "'{}' is not a decimal number", s),
            AmountError::OutOfRange(s) => write!(f, "'{}' is out of range", s),
        }
    }
}

impl std::error::Error for AmountError {}
