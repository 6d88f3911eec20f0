//! Gateway amount and timestamp formatting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Formats a non-negative decimal amount as the Gateway's 12-digit
/// zero-padded cents string, e.g. `1000.50` -> `"000000100050"`.
pub fn format_amount(amount: Decimal) -> String {
    let cents = (amount * Decimal::from(100)).round();
    format!("{:012}", cents)
}

/// Inverse of [`format_amount`]. Returns `None` if the string isn't a
/// 12-digit non-negative integer.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    if raw.len() != 12 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let cents = Decimal::from_str(raw).ok()?;
    Some(cents / Decimal::from(100))
}

/// Gateway wire timestamp format: `YYMMDDHHmmss`.
pub fn format_gateway_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%y%m%d%H%M%S").to_string()
}

/// Client webhook timestamp format: `YYYY-MM-DD HH:mm:ss`.
pub fn format_client_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_fractional_amount() {
        assert_eq!(format_amount(Decimal::new(100050, 2)), "000000100050");
    }

    #[test]
    fn formats_zero_amount_for_nec() {
        assert_eq!(format_amount(Decimal::ZERO), "000000000000");
    }

    #[test]
    fn round_trips_through_cents() {
        let original = Decimal::new(100050, 2);
        let formatted = format_amount(original);
        assert_eq!(parse_amount(&formatted).unwrap(), original);
    }

    #[test]
    fn rejects_malformed_amount_strings() {
        assert!(parse_amount("not-twelve-digits").is_none());
        assert!(parse_amount("1234567890123").is_none());
    }
}
