use rust_decimal::Decimal;
use std::str::FromStr;

/// Round a monetary value to two decimal places (registry amounts carry at
/// most kopiyka precision).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp(2)
}

/// Format a monetary value as a fixed two-decimal string ("65.48", "7.00").
pub fn money_str(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

/// Format a quantity with trailing zeros removed ("1", "0.575").
pub fn qty_str(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Parse a user- or registry-supplied amount string. Accepts a comma as the
/// decimal separator; returns the value rounded to 2dp, or `None` when the
/// input is empty or not a number.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok().map(round_money)
}
