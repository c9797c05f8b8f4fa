use crate::error::{FinancialFlowError, Result};
use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;

/// Number of days the default request window reaches back from today.
pub const DEFAULT_LOOKBACK_DAYS: u64 = 365;

/// Returns the default `(start_date, end_date)` window for a request made on `today`.
pub fn default_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today
        .checked_sub_days(Days::new(DEFAULT_LOOKBACK_DAYS))
        .unwrap_or(NaiveDate::MIN);
    (start, today)
}

/// Parses a `YYYY-MM-DD` date string.
pub fn parse_iso_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        FinancialFlowError::DateError(format!(
            "Invalid date format: {}. Expected YYYY-MM-DD",
            value
        ))
    })
}

/// Parses a report or record amount.
///
/// Commas and dollar signs are stripped, accounting parentheses become a minus sign and
/// anything that still fails to parse (including the empty string) is `0.0`.
pub fn parse_amount(value: &str) -> f64 {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let negative = trimmed.starts_with('(') && trimmed.ends_with(')');
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '(' | ')' | ' '))
        .collect();

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => {
            if negative {
                -v.abs()
            } else {
                v
            }
        }
        _ => 0.0,
    }
}

/// Strips a `Parent:` prefix, keeping the right-most colon-separated segment, and trims it.
pub fn strip_parent_prefix(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name).trim()
}

pub fn sum_values(map: &BTreeMap<String, f64>) -> f64 {
    map.values().sum()
}

/// Adds every entry of `other` into `target`, summing amounts on key collisions.
pub fn merge_sum(target: &mut BTreeMap<String, f64>, other: &BTreeMap<String, f64>) {
    for (key, value) in other {
        *target.entry(key.clone()).or_insert(0.0) += value;
    }
}

pub fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}
