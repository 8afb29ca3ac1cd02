//! Conversion between human-readable decimal amounts and integer units.
//!
//! This is the only place a decimal string turns into a `u64`. Parsing is
//! exact: no floating point, at most [`AMOUNT_DECIMALS`] fractional digits,
//! and the result must lie in `1..=MAX_MONEY`.

use crate::constants::{AMOUNT_DECIMALS, COIN, MAX_MONEY};
use crate::error::AmountError;

/// Parse a decimal amount such as `"12.5"` or `"0.00000001"` into units.
///
/// # Examples
///
/// ```
/// use cirrus_core::amount::parse_amount;
/// use cirrus_core::constants::COIN;
/// assert_eq!(parse_amount("1.5").unwrap(), 3 * COIN / 2);
/// assert!(parse_amount("0").is_err());
/// ```
pub fn parse_amount(s: &str) -> Result<u64, AmountError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::Empty);
    }
    if let Some(c) = whole.chars().chain(frac.chars()).find(|c| !c.is_ascii_digit()) {
        return Err(AmountError::InvalidCharacter(c));
    }
    if frac.len() > AMOUNT_DECIMALS as usize {
        return Err(AmountError::TooManyDecimals { max: AMOUNT_DECIMALS });
    }

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u64>()
            .map_err(|_| AmountError::OutOfRange)?
            .checked_mul(COIN)
            .ok_or(AmountError::OutOfRange)?
    };

    let frac_units = if frac.is_empty() {
        0
    } else {
        let scale = 10u64.pow(AMOUNT_DECIMALS - frac.len() as u32);
        frac.parse::<u64>().map_err(|_| AmountError::OutOfRange)? * scale
    };

    let units = whole_units
        .checked_add(frac_units)
        .ok_or(AmountError::OutOfRange)?;
    check_range(units)
}

/// Validate that an integer amount lies in `1..=MAX_MONEY`.
pub fn check_range(units: u64) -> Result<u64, AmountError> {
    if units == 0 {
        return Err(AmountError::NotPositive);
    }
    if units > MAX_MONEY {
        return Err(AmountError::OutOfRange);
    }
    Ok(units)
}

/// Render units as a decimal string with trailing zeros trimmed.
///
/// # Examples
///
/// ```
/// use cirrus_core::amount::format_amount;
/// assert_eq!(format_amount(150_000_000), "1.5");
/// assert_eq!(format_amount(100_000_000), "1");
/// ```
pub fn format_amount(units: u64) -> String {
    let whole = units / COIN;
    let frac = units % COIN;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{frac:0width$}", width = AMOUNT_DECIMALS as usize);
    format!("{whole}.{}", digits.trim_end_matches('0'))
}
