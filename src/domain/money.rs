use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

/// Amounts are stored as signed integer minor units (two decimal places).
/// 100.50 is stored as 10050.
pub type Cents = i64;

/// Number of decimal places carried by [`Cents`].
pub const CENTS_SCALE: u32 = 2;

/// Convert cents into an exact decimal value.
pub fn cents_to_decimal(cents: Cents) -> Decimal {
    Decimal::new(cents, CENTS_SCALE)
}

/// Format cents as a plain decimal string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    cents_to_decimal(cents).to_string()
}

/// Parse a decimal string into cents.
///
/// Accepts at most two fractional digits; "12.345" is rejected rather than
/// silently truncated since the ledger cannot represent it.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let value = Decimal::from_str(input.trim()).map_err(|_| ParseCentsError::InvalidFormat)?;
    if value.normalize().scale() > CENTS_SCALE {
        return Err(ParseCentsError::TooPrecise);
    }

    let cents = value
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or(ParseCentsError::OutOfRange)?;
    i64::try_from(cents).map_err(|_| ParseCentsError::OutOfRange)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
    TooPrecise,
    OutOfRange,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
            ParseCentsError::TooPrecise => write!(f, "at most two decimal places are allowed"),
            ParseCentsError::OutOfRange => write!(f, "amount out of range"),
        }
    }
}

impl std::error::Error for ParseCentsError {}
