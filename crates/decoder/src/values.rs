//! Field-level conversions shared by the RQ and CHECK schema parsers.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::str::FromStr;

/// RQ money fields are integers in minor units: "6548" -> 65.48.
pub fn money_from_minor_units(raw: Option<&str>) -> Option<Decimal> {
    let n: i64 = raw?.trim().parse().ok()?;
    Some((Decimal::from(n) / Decimal::from(100)).round_dp(2))
}

/// RQ quantities are integer thousandths: "1000" -> 1, "575" -> 0.575.
pub fn qty_from_thousandths(raw: Option<&str>) -> Option<Decimal> {
    let n: i64 = raw?.trim().parse().ok()?;
    Some((Decimal::from(n) / Decimal::from(1000)).normalize())
}

/// CHECK fields are decimal text, sometimes with a comma separator.
pub fn decimal_field(raw: Option<&str>) -> Option<Decimal> {
    Decimal::from_str(&raw?.trim().replace(',', ".")).ok()
}

/// Line numbers are numeric in practice; anything else is dropped.
pub fn line_number(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse().ok()
}

/// Registry item names pad with non-breaking spaces.
pub fn strip_nbsp(raw: &str) -> String {
    raw.replace('\u{a0}', " ").trim().to_string()
}

/// RQ compact timestamp: exactly 14 digits, `YYYYMMDDHHMMSS`.
pub fn parse_compact_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let ts = raw.trim();
    if ts.len() != 14 || !ts.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(ts, "%Y%m%d%H%M%S").ok()
}

/// CHECK split timestamp: 8-digit `DDMMYYYY` date plus 6-digit `HHMMSS` time.
/// Either half malformed or absent yields no datetime.
pub fn parse_date_time_pair(date: &str, time: &str) -> Option<NaiveDateTime> {
    let (d, t) = (date.trim(), time.trim());
    if d.len() != 8
        || t.len() != 6
        || !d.bytes().all(|b| b.is_ascii_digit())
        || !t.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    NaiveDateTime::parse_from_str(&format!("{d}{t}"), "%d%m%Y%H%M%S").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minor_units_divide_by_hundred() {
        assert_eq!(money_from_minor_units(Some("6548")), Some(dec!(65.48)));
        assert_eq!(money_from_minor_units(Some("0")), Some(dec!(0.00)));
        assert_eq!(money_from_minor_units(Some("7")), Some(dec!(0.07)));
    }

    #[test]
    fn minor_units_reject_non_integers() {
        assert_eq!(money_from_minor_units(Some("65.48")), None);
        assert_eq!(money_from_minor_units(Some("abc")), None);
        assert_eq!(money_from_minor_units(None), None);
    }

    #[test]
    fn thousandths_normalize_trailing_zeros() {
        assert_eq!(qty_from_thousandths(Some("1000")).map(|d| d.to_string()), Some("1".into()));
        assert_eq!(qty_from_thousandths(Some("575")).map(|d| d.to_string()), Some("0.575".into()));
        assert_eq!(qty_from_thousandths(Some("2500")).map(|d| d.to_string()), Some("2.5".into()));
    }

    #[test]
    fn decimal_field_accepts_comma() {
        assert_eq!(decimal_field(Some("12,5")), Some(dec!(12.5)));
        assert_eq!(decimal_field(Some("12.5")), Some(dec!(12.5)));
        assert_eq!(decimal_field(Some("x")), None);
    }

    #[test]
    fn compact_timestamp_requires_14_digits() {
        let dt = parse_compact_timestamp("20240115123045").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 12:30:45");
        assert!(parse_compact_timestamp("2024011512304").is_none());
        assert!(parse_compact_timestamp("2024-01-15 12:30").is_none());
    }

    #[test]
    fn date_time_pair_is_day_month_year() {
        let dt = parse_date_time_pair("15012024", "123045").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 12:30:45");
    }

    #[test]
    fn date_time_pair_rejects_malformed_halves() {
        assert!(parse_date_time_pair("1512024", "123045").is_none());
        assert!(parse_date_time_pair("15012024", "1230").is_none());
        assert!(parse_date_time_pair("99999999", "123045").is_none());
    }

    #[test]
    fn nbsp_is_folded_to_space() {
        assert_eq!(strip_nbsp("Пиво\u{a0}світле\u{a0}"), "Пиво світле");
    }
}
