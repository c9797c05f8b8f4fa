use crate::accounts::extract_account_number;
use crate::utils::{merge_sum, sum_values};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mid-level expense node: a report data row, or a report section flattened into its leaves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SecondaryNode {
    pub total: f64,

    /// First four-digit number in the report name, taken before any display rewrite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tertiaries: BTreeMap<String, f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<BTreeMap<String, f64>>,
}

impl SecondaryNode {
    pub fn from_row(report_name: &str, amount: f64) -> Self {
        Self {
            total: amount,
            account_number: extract_account_number(report_name),
            ..Default::default()
        }
    }

    pub fn from_section(report_name: &str, tertiaries: BTreeMap<String, f64>) -> Self {
        Self {
            total: sum_values(&tertiaries),
            account_number: extract_account_number(report_name),
            tertiaries,
            projects: None,
        }
    }

    pub fn is_section(&self) -> bool {
        !self.tertiaries.is_empty()
    }

    pub fn projects_total(&self) -> f64 {
        self.projects.as_ref().map(sum_values).unwrap_or(0.0)
    }

    fn absorb(&mut self, other: SecondaryNode) {
        merge_sum(&mut self.tertiaries, &other.tertiaries);
        self.total = if self.tertiaries.is_empty() {
            self.total + other.total
        } else {
            sum_values(&self.tertiaries)
        };
        if self.account_number.is_none() {
            self.account_number = other.account_number;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PrimaryNode {
    /// Always the sum of the secondaries; any total the report prints is ignored.
    pub total: f64,
    pub secondaries: BTreeMap<String, SecondaryNode>,
}

impl PrimaryNode {
    pub fn insert_secondary(&mut self, name: String, node: SecondaryNode) {
        match self.secondaries.get_mut(&name) {
            Some(existing) => existing.absorb(node),
            None => {
                self.secondaries.insert(name, node);
            }
        }
        self.recompute_total();
    }

    pub fn recompute_total(&mut self) {
        self.total = self.secondaries.values().map(|s| s.total).sum();
    }
}

/// The three-level expense tree: primary -> secondary -> tertiary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ExpenseHierarchy {
    pub primaries: BTreeMap<String, PrimaryNode>,
}

impl ExpenseHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a primary, merging secondaries into an existing primary of the same name.
    pub fn insert_primary(&mut self, name: String, node: PrimaryNode) {
        match self.primaries.get_mut(&name) {
            Some(existing) => {
                for (secondary_name, secondary) in node.secondaries {
                    existing.insert_secondary(secondary_name, secondary);
                }
            }
            None => {
                self.primaries.insert(name, node);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primaries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.primaries.values().map(|p| p.total).sum()
    }

    /// Leaf view: data-row secondaries by their own name, section secondaries by their
    /// tertiaries. Sums to [`ExpenseHierarchy::total`].
    pub fn flat_expenses(&self) -> BTreeMap<String, f64> {
        let mut flat = BTreeMap::new();
        for primary in self.primaries.values() {
            for (name, secondary) in &primary.secondaries {
                if secondary.is_section() {
                    merge_sum(&mut flat, &secondary.tertiaries);
                } else {
                    *flat.entry(name.clone()).or_insert(0.0) += secondary.total;
                }
            }
        }
        flat
    }

    /// `(primary, secondary, node)` for every secondary.
    pub fn secondaries(&self) -> impl Iterator<Item = (&str, &str, &SecondaryNode)> {
        self.primaries.iter().flat_map(|(primary, node)| {
            node.secondaries
                .iter()
                .map(move |(name, secondary)| (primary.as_str(), name.as_str(), secondary))
        })
    }

    pub fn secondaries_mut(&mut self) -> impl Iterator<Item = (&str, &mut SecondaryNode)> {
        self.primaries.values_mut().flat_map(|node| {
            node.secondaries
                .iter_mut()
                .map(|(name, secondary)| (name.as_str(), secondary))
        })
    }
}
