use crate::accounts::account_number_value;
use crate::schema::GroupRange;
use log::debug;
use std::collections::BTreeMap;

/// Folds small flat expenses into their account-range bucket for display.
///
/// An item is bucketed when its amount is below `threshold` and its account number falls in
/// one of `ranges` (first match wins). Everything else is kept under its own name.
pub fn group_small_expenses(
    expenses: &BTreeMap<String, f64>,
    ranges: &[GroupRange],
    threshold: f64,
) -> BTreeMap<String, f64> {
    let mut grouped = BTreeMap::new();

    for (name, amount) in expenses {
        let bucket = (*amount < threshold)
            .then(|| account_number_value(name))
            .flatten()
            .and_then(|number| ranges.iter().find(|range| range.contains(number)));

        match bucket {
            Some(range) => {
                debug!("Grouping '{}' ({:.2}) into '{}'", name, amount, range.bucket_name());
                *grouped.entry(range.bucket_name()).or_insert(0.0) += amount;
            }
            None => {
                *grouped.entry(name.clone()).or_insert(0.0) += amount;
            }
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges() -> Vec<GroupRange> {
        vec![
            GroupRange::new("Fringe & Benefits", 6000, 6300),
            GroupRange::new("Facility", 6500, 6999),
            GroupRange::new("OH Other", 7000, 7500),
            GroupRange::new("GA Other", 8000, 8499),
        ]
    }

    #[test]
    fn test_small_items_are_bucketed() {
        let expenses = BTreeMap::from([
            ("6010 Health Insurance".to_string(), 4000.0),
            ("6110 FICA".to_string(), 2500.0),
            ("6500 Rent".to_string(), 9999.99),
            ("8005 Salaries and Wages".to_string(), 30000.0),
            ("8010 Office Supplies".to_string(), 10000.0),
            ("7600 Recruiting".to_string(), 50.0),
            ("Billable Salaries and Wages".to_string(), 500.0),
        ]);

        let grouped = group_small_expenses(&expenses, &ranges(), 10_000.0);
        assert_eq!(grouped["6000-6300 Fringe & Benefits"], 6500.0);
        assert_eq!(grouped["6500-6999 Facility"], 9999.99);
        assert_eq!(grouped["8005 Salaries and Wages"], 30000.0);
        assert_eq!(grouped["8010 Office Supplies"], 10000.0);
        assert_eq!(grouped["7600 Recruiting"], 50.0);
        assert_eq!(grouped["Billable Salaries and Wages"], 500.0);
        assert!(!grouped.contains_key("6110 FICA"));
        assert_eq!(grouped.values().sum::<f64>(), expenses.values().sum::<f64>());
    }

    #[test]
    fn test_range_bounds_inclusive() {
        let expenses = BTreeMap::from([
            ("6300 Workers Comp".to_string(), 10.0),
            ("7500 Depreciation".to_string(), 10.0),
            ("6301 Training".to_string(), 10.0),
        ]);
        let grouped = group_small_expenses(&expenses, &ranges(), 10_000.0);
        assert_eq!(grouped["6000-6300 Fringe & Benefits"], 10.0);
        assert_eq!(grouped["7000-7500 OH Other"], 10.0);
        assert_eq!(grouped["6301 Training"], 10.0);
    }
}
