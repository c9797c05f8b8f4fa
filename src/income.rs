use crate::accounts::is_revenue_account;
use crate::normalizer::ProjectNormalizer;
use crate::records::{LedgerTransaction, PostingType, TransactionKind};
use crate::utils::{merge_sum, strip_parent_prefix};
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static TRANSFER_DOC_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)journal|(?:^|[^a-z])je(?:[^a-z]|$)|transfer|adjustment")
        .expect("hardcoded regex should be valid")
});

/// Where the emitted income map came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IncomeSourceType {
    /// Invoices, sales receipts and journal adjustments grouped by project.
    Projects,
    /// Flat income rows of the profit and loss report.
    Accounts,
    #[default]
    None,
}

/// Per-source project income before merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomeBreakdown {
    pub invoices: BTreeMap<String, f64>,
    pub receipts: BTreeMap<String, f64>,
    pub journal_adjustments: BTreeMap<String, f64>,
}

impl IncomeBreakdown {
    pub fn merged(&self) -> BTreeMap<String, f64> {
        let mut merged = BTreeMap::new();
        merge_sum(&mut merged, &self.invoices);
        merge_sum(&mut merged, &self.receipts);
        merge_sum(&mut merged, &self.journal_adjustments);
        merged
    }
}

pub struct IncomeAggregator<'a> {
    normalizer: &'a ProjectNormalizer,
}

impl<'a> IncomeAggregator<'a> {
    pub fn new(normalizer: &'a ProjectNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn aggregate(
        &self,
        invoices: &[LedgerTransaction],
        receipts: &[LedgerTransaction],
        journal_entries: &[LedgerTransaction],
    ) -> IncomeBreakdown {
        let breakdown = IncomeBreakdown {
            invoices: self.sales_totals(invoices),
            receipts: self.sales_totals(receipts),
            journal_adjustments: self.journal_adjustments(journal_entries),
        };

        info!(
            "Income by project: {} from invoices, {} from sales receipts, {} from journal entries",
            breakdown.invoices.len(),
            breakdown.receipts.len(),
            breakdown.journal_adjustments.len()
        );
        breakdown
    }

    /// Groups eligible invoice or sales-receipt totals by resolved customer.
    pub fn sales_totals(&self, documents: &[LedgerTransaction]) -> BTreeMap<String, f64> {
        let mut totals = BTreeMap::new();

        for txn in documents {
            let Some(amount) = signed_sales_amount(txn) else {
                debug!(
                    "Skipping {} with total {} (zero, credit or refund)",
                    txn.label(),
                    txn.total
                );
                continue;
            };

            let Some(project) = txn
                .customer
                .as_deref()
                .and_then(|customer| self.resolve_customer(customer))
            else {
                debug!("Skipping {}: no customer", txn.label());
                continue;
            };

            *totals.entry(project).or_insert(0.0) += amount;
        }

        totals
    }

    /// Signed revenue deltas from journal-entry lines on revenue accounts: a credit adds to
    /// the project, a debit takes away. Deltas net within each entry before accumulating.
    pub fn journal_adjustments(&self, entries: &[LedgerTransaction]) -> BTreeMap<String, f64> {
        let mut totals = BTreeMap::new();

        for entry in entries {
            let mut per_entry: BTreeMap<String, f64> = BTreeMap::new();

            for line in &entry.lines {
                if line.amount == 0.0 {
                    continue;
                }
                let on_revenue_account = line.account.as_deref().is_some_and(is_revenue_account);
                if !on_revenue_account {
                    continue;
                }

                let delta = match line.posting {
                    PostingType::Credit => line.amount.abs(),
                    PostingType::Debit => -line.amount.abs(),
                    PostingType::Unknown => continue,
                };

                let Some(project) = line
                    .entity
                    .as_deref()
                    .and_then(|entity| self.resolve_customer(entity))
                else {
                    debug!(
                        "Skipping revenue line on {} in {}: no entity",
                        line.account.as_deref().unwrap_or("?"),
                        entry.label()
                    );
                    continue;
                };

                *per_entry.entry(project).or_insert(0.0) += delta;
            }

            merge_sum(&mut totals, &per_entry);
        }

        totals
    }

    /// Canonical project for a customer, or the customer's own name when it is not a
    /// registered project.
    fn resolve_customer(&self, customer: &str) -> Option<String> {
        self.normalizer.normalize(customer).or_else(|| {
            let name = strip_parent_prefix(customer);
            (!name.is_empty()).then(|| name.to_string())
        })
    }
}

/// Applies the sign rule to an invoice or sales-receipt total. Negative totals survive as
/// positive transfers only for journal-like documents.
pub fn signed_sales_amount(txn: &LedgerTransaction) -> Option<f64> {
    if txn.total > 0.0 {
        Some(txn.total)
    } else if txn.total < 0.0 && is_transfer_like(txn) {
        Some(txn.total.abs())
    } else {
        None
    }
}

pub fn is_transfer_like(txn: &LedgerTransaction) -> bool {
    let journal_type = txn.kind == TransactionKind::JournalEntry
        || txn.txn_type.as_deref().is_some_and(|t| {
            let compact: String = t.chars().filter(|c| !c.is_whitespace()).collect();
            compact.eq_ignore_ascii_case("journalentry")
        });

    journal_type
        || txn
            .doc_number
            .as_deref()
            .is_some_and(|doc| TRANSFER_DOC_NUMBER.is_match(doc))
}
