//! Monetary amounts as i64 micro-units (4 fractional digits, scale 10_000).
//! The request boundary carries decimal strings; everything past it is
//! integer arithmetic. Exchange rates are i64 micro-rate units (scale
//! 1_000_000) and rate multiplication rounds half-to-even at the 4-digit
//! boundary.

use crate::error::LedgerError;

/// Micro-units per whole currency unit.
pub const AMOUNT_SCALE: i64 = 10_000;

/// Micro-rate units per 1.0 of exchange rate.
pub const RATE_SCALE: i64 = 1_000_000;

/// Rounding policy recorded in conversion event payloads.
pub const ROUNDING_POLICY: &str = "half_even";

/// Parse a decimal string ("100", "100.5", "100.0001") into micro-units.
/// Rejects non-positive values and more than 4 fractional digits.
pub fn parse_amount(input: &str) -> Result<i64, LedgerError> {
    let trimmed = input.trim();
    let negative = trimmed.starts_with('-');

    let (whole, frac) = match trimmed.trim_start_matches(['-', '+']).split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed.trim_start_matches(['-', '+']), ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(LedgerError::InvalidAmount(format!("not a number: {input:?}")));
    }
    if frac.len() > 4 {
        return Err(LedgerError::InvalidAmount(format!(
            "at most 4 fractional digits are representable, got {:?}",
            input
        )));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(LedgerError::InvalidAmount(format!("not a number: {input:?}")));
    }

    let whole_units: i64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| LedgerError::InvalidAmount(format!("amount out of range: {input:?}")))?
    };

    let mut frac_units: i64 = 0;
    if !frac.is_empty() {
        frac_units = frac
            .parse()
            .map_err(|_| LedgerError::InvalidAmount(format!("not a number: {input:?}")))?;
        for _ in frac.len()..4 {
            frac_units *= 10;
        }
    }

    let units = whole_units
        .checked_mul(AMOUNT_SCALE)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(|| LedgerError::InvalidAmount(format!("amount out of range: {input:?}")))?;

    if negative || units <= 0 {
        return Err(LedgerError::InvalidAmount(
            "amount must be positive".to_string(),
        ));
    }

    Ok(units)
}

/// Format micro-units back into a decimal string with 4 fractional digits.
pub fn format_amount(units: i64) -> String {
    let sign = if units < 0 { "-" } else { "" };
    let abs = units.unsigned_abs();
    format!(
        "{}{}.{:04}",
        sign,
        abs / AMOUNT_SCALE as u64,
        abs % AMOUNT_SCALE as u64
    )
}

/// Parse an exchange rate string into micro-rate units (up to 6 fractional
/// digits). Rates must be strictly positive.
pub fn parse_rate(input: &str) -> Result<i64, LedgerError> {
    let trimmed = input.trim();
    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    if frac.len() > 6
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
        || (whole.is_empty() && frac.is_empty())
    {
        return Err(LedgerError::InvalidAmount(format!("invalid rate: {input:?}")));
    }

    let whole_units: i64 = if whole.is_empty() { 0 } else { whole.parse().unwrap_or(-1) };
    let mut frac_units: i64 = if frac.is_empty() { 0 } else { frac.parse().unwrap_or(-1) };
    if whole_units < 0 || frac_units < 0 {
        return Err(LedgerError::InvalidAmount(format!("invalid rate: {input:?}")));
    }
    for _ in frac.len()..6 {
        frac_units *= 10;
    }

    let units = whole_units
        .checked_mul(RATE_SCALE)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(|| LedgerError::InvalidAmount(format!("rate out of range: {input:?}")))?;

    if units <= 0 {
        return Err(LedgerError::InvalidAmount("rate must be positive".to_string()));
    }
    Ok(units)
}

pub fn format_rate(rate_micros: i64) -> String {
    format!("{}.{:06}", rate_micros / RATE_SCALE, rate_micros % RATE_SCALE)
}

/// Multiply an amount by an exchange rate, rounding half-to-even at the
/// micro-unit boundary. The i128 intermediate cannot overflow for any pair
/// of i64 inputs.
pub fn convert(amount_units: i64, rate_micros: i64) -> Result<i64, LedgerError> {
    let numerator = amount_units as i128 * rate_micros as i128;
    let denominator = RATE_SCALE as i128;

    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    let half = denominator / 2;

    let rounded = if remainder.abs() > half || (remainder.abs() == half && quotient % 2 != 0) {
        quotient + numerator.signum()
    } else {
        quotient
    };

    i64::try_from(rounded)
        .map_err(|_| LedgerError::InvalidAmount("converted amount out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(parse_amount("100").unwrap(), 1_000_000);
        assert_eq!(parse_amount("100.00").unwrap(), 1_000_000);
        assert_eq!(parse_amount("100.5").unwrap(), 1_005_000);
        assert_eq!(parse_amount("0.0001").unwrap(), 1);
        assert_eq!(parse_amount(".25").unwrap(), 2_500);
    }

    #[test]
    fn rejects_zero_negative_and_overscaled() {
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("0.0000").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("1.00001").is_err());
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("").is_err());
        assert!(parse_amount("1.2.3").is_err());
    }

    #[test]
    fn formats_round_trip() {
        assert_eq!(format_amount(1_000_000), "100.0000");
        assert_eq!(format_amount(1), "0.0001");
        assert_eq!(format_amount(600_000), "60.0000");
        assert_eq!(parse_amount(&format_amount(123_456)).unwrap(), 123_456);
    }

    #[test]
    fn rate_parsing() {
        assert_eq!(parse_rate("1").unwrap(), 1_000_000);
        assert_eq!(parse_rate("0.905").unwrap(), 905_000);
        assert_eq!(parse_rate("32.451234").unwrap(), 32_451_234);
        assert!(parse_rate("0").is_err());
        assert!(parse_rate("1.2345678").is_err());
    }

    #[test]
    fn conversion_uses_bankers_rounding() {
        // 1.0000 * 0.905 = 0.9050, exact
        assert_eq!(convert(10_000, 905_000).unwrap(), 9_050);
        // 0.0001 * 0.5 = 0.00005 -> ties to even (0.0000)
        assert_eq!(convert(1, 500_000).unwrap(), 0);
        // 0.0003 * 0.5 = 0.00015 -> ties to even (0.0002)
        assert_eq!(convert(3, 500_000).unwrap(), 2);
        // 0.0001 * 0.6 = 0.00006 -> rounds up
        assert_eq!(convert(1, 600_000).unwrap(), 1);
    }

    #[test]
    fn conversion_is_deterministic_for_recorded_rate() {
        let amount = parse_amount("250.75").unwrap();
        let rate = parse_rate("0.912345").unwrap();
        let first = convert(amount, rate).unwrap();
        let second = convert(amount, rate).unwrap();
        assert_eq!(first, second);
    }
}
