use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Safety valve for catch-up materialization: one read-path invocation never
/// replays more than this many missed periods for a single subscription.
pub const MAX_CATCHUP_RUNS: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePeriod {
    Weekly,
    Monthly,
    Yearly,
}

impl fmt::Display for RecurrencePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecurrencePeriod::Weekly => write!(f, "weekly"),
            RecurrencePeriod::Monthly => write!(f, "monthly"),
            RecurrencePeriod::Yearly => write!(f, "yearly"),
        }
    }
}

impl std::str::FromStr for RecurrencePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weekly" => Ok(RecurrencePeriod::Weekly),
            "monthly" => Ok(RecurrencePeriod::Monthly),
            "yearly" => Ok(RecurrencePeriod::Yearly),
            other => Err(format!("Unknown recurrence period: '{other}'")),
        }
    }
}

/// A recurring financial commitment. `next_run_date` is `None` only when the
/// subscription is inactive or has never started; otherwise it is the next
/// date at or after `last_run_date` per the recurrence rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub owner_id: i64,
    pub name: Option<String>,
    pub amount: Decimal,
    pub category: Option<String>,
    pub note: Option<String>,
    pub payment_method: Option<String>,
    pub merchant: Option<String>,
    pub is_income: bool,
    pub period: RecurrencePeriod,
    /// Calendar day (1-31) the subscription recurs on.
    pub anchor_day: u32,
    /// Calendar month (1-12); only consulted for yearly periods.
    pub anchor_month: u32,
    pub next_run_date: Option<NaiveDate>,
    pub last_run_date: Option<NaiveDate>,
    pub is_active: bool,
    /// Optimistic-concurrency counter bumped on every catch-up advance.
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A materialized financial record. Immutable once created, apart from
/// explicit user edits handled outside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub owner_id: i64,
    pub subscription_id: Option<i64>,
    pub check_id: Option<String>,
    pub amount: Decimal,
    pub receipt_date: Option<String>,
    pub merchant: Option<String>,
    pub kind: String,
    pub is_income: bool,
    pub category: Option<String>,
    pub note: Option<String>,
    pub payment_method: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    // The first of the following month, minus one day.
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .map(|d| d.day())
        .unwrap_or(28)
}

fn add_months(base: NaiveDate, months: u32, anchor_day: u32) -> NaiveDate {
    let total = base.year() * 12 + base.month0() as i32 + months as i32;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let day = anchor_day.min(last_day_of_month(year, month));
    // day is clamped to a valid day of (year, month); the constructor cannot fail
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(base)
}

/// Next occurrence after `last_run`. Monthly and yearly anchors past the end
/// of the target month clamp to that month's last valid day; they never roll
/// into the following month.
pub fn next_occurrence(
    last_run: NaiveDate,
    anchor_day: u32,
    anchor_month: u32,
    period: RecurrencePeriod,
) -> NaiveDate {
    match period {
        RecurrencePeriod::Weekly => last_run + Days::new(7),
        RecurrencePeriod::Monthly => add_months(last_run, 1, anchor_day),
        RecurrencePeriod::Yearly => {
            let year = last_run.year() + 1;
            let day = anchor_day.min(last_day_of_month(year, anchor_month));
            NaiveDate::from_ymd_opt(year, anchor_month, day).unwrap_or(last_run)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekly_is_exactly_seven_days() {
        assert_eq!(
            next_occurrence(d(2024, 1, 15), 15, 1, RecurrencePeriod::Weekly),
            d(2024, 1, 22)
        );
        // Crossing a month boundary is just date arithmetic.
        assert_eq!(
            next_occurrence(d(2024, 1, 29), 29, 1, RecurrencePeriod::Weekly),
            d(2024, 2, 5)
        );
    }

    #[test]
    fn monthly_anchor_31_clamps_to_short_months() {
        // Jan 31 -> Feb 29 (2024 is a leap year), never March.
        assert_eq!(
            next_occurrence(d(2024, 1, 31), 31, 1, RecurrencePeriod::Monthly),
            d(2024, 2, 29)
        );
        // Non-leap year: Feb 28.
        assert_eq!(
            next_occurrence(d(2025, 1, 31), 31, 1, RecurrencePeriod::Monthly),
            d(2025, 2, 28)
        );
    }

    #[test]
    fn monthly_recovers_anchor_after_short_month() {
        // The clamp is per-month: after Feb 29 the anchor day 31 reappears in March.
        assert_eq!(
            next_occurrence(d(2024, 2, 29), 31, 2, RecurrencePeriod::Monthly),
            d(2024, 3, 31)
        );
    }

    #[test]
    fn monthly_crosses_year_boundary() {
        assert_eq!(
            next_occurrence(d(2024, 12, 15), 15, 12, RecurrencePeriod::Monthly),
            d(2025, 1, 15)
        );
    }

    #[test]
    fn yearly_clamps_feb_29_on_non_leap_years() {
        assert_eq!(
            next_occurrence(d(2024, 2, 29), 29, 2, RecurrencePeriod::Yearly),
            d(2025, 2, 28)
        );
    }

    #[test]
    fn yearly_uses_anchor_month() {
        assert_eq!(
            next_occurrence(d(2024, 6, 10), 10, 6, RecurrencePeriod::Yearly),
            d(2025, 6, 10)
        );
    }

    #[test]
    fn period_parses_case_insensitively() {
        use std::str::FromStr;
        assert_eq!(RecurrencePeriod::from_str("Weekly").unwrap(), RecurrencePeriod::Weekly);
        assert_eq!(RecurrencePeriod::from_str("monthly").unwrap(), RecurrencePeriod::Monthly);
        assert!(RecurrencePeriod::from_str("daily").is_err());
    }

    #[test]
    fn period_display_roundtrip() {
        use std::str::FromStr;
        for p in [RecurrencePeriod::Weekly, RecurrencePeriod::Monthly, RecurrencePeriod::Yearly] {
            assert_eq!(RecurrencePeriod::from_str(&p.to_string()).unwrap(), p);
        }
    }
}
