//! Account-number extraction and the account/class predicates shared by the classifiers,
//! the report parser and the integrator.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static ACCOUNT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}").expect("hardcoded regex should be valid"));

/// Contractor form label, not an account number ("5011 Direct 1099 Labor").
const FORM_1099: &str = "1099";

const GA_CLASS_MARKERS: [&str; 6] = [
    "8005",
    "salaries and wages (ga)",
    "salaries & wages (ga)",
    "general & administrative",
    "general and administrative",
    "g&a",
];

/// Returns the first four-digit run in an account display name.
pub fn extract_account_number(name: &str) -> Option<String> {
    let mut numbers = ACCOUNT_NUMBER.find_iter(name).map(|m| m.as_str());
    let number = if is_direct_contractor_labor(&name.to_lowercase()) {
        numbers.find(|n| *n != FORM_1099)
    } else {
        numbers.next()
    };
    number.map(str::to_string)
}

/// Extracts the account number, falling back to name heuristics for the attributed
/// salary and contractor accounts when the display name carries no number.
pub fn infer_account_number(name: &str) -> Option<String> {
    if let Some(number) = extract_account_number(name) {
        return Some(number);
    }

    let lower = name.to_lowercase();
    let salaries_and_wages = (lower.contains("salaries") || lower.contains("salary"))
        && (lower.contains("wages") || lower.contains("wage"));

    if salaries_and_wages && (lower.contains("cogs") || lower.contains("cost of goods")) {
        return Some("5001".to_string());
    }
    if is_direct_contractor_labor(&lower) {
        return Some("5011".to_string());
    }
    if salaries_and_wages
        && (lower.contains("(ga)")
            || lower.contains(" ga")
            || lower.contains("g&a")
            || lower.contains("general"))
    {
        return Some("8005".to_string());
    }

    None
}

fn is_direct_contractor_labor(lower: &str) -> bool {
    lower.contains("direct") && lower.contains(FORM_1099) && lower.contains("labor")
}

/// True when a class reference tags a line as general & administrative.
pub fn is_ga_class(class_name: &str) -> bool {
    let lower = class_name.to_lowercase();
    GA_CLASS_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Revenue-like accounts for journal-entry income adjustments.
pub fn is_revenue_account(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("revenue")
        || lower.contains("income")
        || extract_account_number(name).as_deref() == Some("4005")
}

/// Applies the configured display-name rewrites (case-insensitive, whole name).
pub fn rewrite_display_name(name: &str, rewrites: &BTreeMap<String, String>) -> String {
    let trimmed = name.trim();
    rewrites
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(trimmed))
        .map(|(_, to)| to.clone())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Numeric form of an account number, for range bucketing.
pub fn account_number_value(name: &str) -> Option<u32> {
    extract_account_number(name).and_then(|n| n.parse().ok())
}
