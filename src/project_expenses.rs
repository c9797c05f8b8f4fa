use crate::classifier::{
    classify_line, AggregationPolicy, LineDecision, ProjectResolver, ProjectSource,
};
use crate::records::{LedgerTransaction, TransactionKind};
use crate::schema::FlowConfig;
use crate::utils::merge_sum;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One `(account, project, |amount|)` contribution of an eligible line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseAttribution {
    pub account_number: String,
    pub project: String,
    pub amount: f64,
    pub source: ProjectSource,
    pub kind: TransactionKind,
}

/// Account number -> project -> amount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectExpenses {
    accounts: BTreeMap<String, BTreeMap<String, f64>>,
}

impl ProjectExpenses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, attribution: &ExpenseAttribution) {
        *self
            .accounts
            .entry(attribution.account_number.clone())
            .or_default()
            .entry(attribution.project.clone())
            .or_insert(0.0) += attribution.amount;
    }

    pub fn merge(&mut self, other: &ProjectExpenses) {
        for (account, projects) in &other.accounts {
            merge_sum(self.accounts.entry(account.clone()).or_default(), projects);
        }
    }

    pub fn for_account(&self, account_number: &str) -> Option<&BTreeMap<String, f64>> {
        self.accounts.get(account_number)
    }

    pub fn accounts(&self) -> &BTreeMap<String, BTreeMap<String, f64>> {
        &self.accounts
    }

    pub fn account_total(&self, account_number: &str) -> f64 {
        self.for_account(account_number)
            .map(|projects| projects.values().sum())
            .unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Re-keys the account maps by their configured display names.
    pub fn keyed_by_display_name(
        &self,
        config: &FlowConfig,
    ) -> BTreeMap<String, BTreeMap<String, f64>> {
        let mut keyed: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        for (account, projects) in &self.accounts {
            merge_sum(
                keyed.entry(config.display_name_for(account)).or_default(),
                projects,
            );
        }
        keyed
    }
}

impl FromIterator<ExpenseAttribution> for ProjectExpenses {
    fn from_iter<I: IntoIterator<Item = ExpenseAttribution>>(iter: I) -> Self {
        let mut expenses = ProjectExpenses::new();
        for attribution in iter {
            expenses.record(&attribution);
        }
        expenses
    }
}

/// Walks journal entries, bills and purchases under one [`AggregationPolicy`] and sums the
/// attributed amounts per target account and project.
pub struct ProjectExpenseAggregator<'a> {
    policy: AggregationPolicy,
    resolver: ProjectResolver<'a>,
}

impl<'a> ProjectExpenseAggregator<'a> {
    pub fn new(policy: AggregationPolicy, resolver: ProjectResolver<'a>) -> Self {
        Self { policy, resolver }
    }

    /// Every attribution the transactions of one source produce, in line order.
    pub fn attributions(&self, transactions: &[LedgerTransaction]) -> Vec<ExpenseAttribution> {
        let mut attributions = Vec::new();

        for txn in transactions {
            for line in &txn.lines {
                let account_number = match classify_line(&self.policy, txn, line) {
                    LineDecision::Eligible { account_number } => account_number,
                    LineDecision::Skipped(reason) => {
                        if line.account.is_some() && line.amount != 0.0 {
                            debug!(
                                "{}: skipping line on '{}' ({:?})",
                                txn.label(),
                                line.account.as_deref().unwrap_or_default(),
                                reason
                            );
                        }
                        continue;
                    }
                };

                let (project, source) = self.resolver.resolve(txn, line, &account_number);
                attributions.push(ExpenseAttribution {
                    account_number,
                    project,
                    amount: line.amount.abs(),
                    source,
                    kind: txn.kind,
                });
            }
        }

        attributions
    }

    /// Runs the three sources in order and merges them by summation.
    pub fn aggregate(
        &self,
        journal_entries: &[LedgerTransaction],
        bills: &[LedgerTransaction],
        purchases: &[LedgerTransaction],
    ) -> ProjectExpenses {
        let mut total = ProjectExpenses::new();

        for (kind, transactions) in [
            (TransactionKind::JournalEntry, journal_entries),
            (TransactionKind::Bill, bills),
            (TransactionKind::Purchase, purchases),
        ] {
            let attributions = self.attributions(transactions);
            let unassigned = attributions
                .iter()
                .filter(|a| a.source == ProjectSource::Unassigned)
                .count();
            info!(
                "{} project expenses from {}: {} lines ({} unassigned)",
                self.policy.category,
                kind,
                attributions.len(),
                unassigned
            );
            total.merge(&attributions.into_iter().collect());
        }

        for (account, projects) in total.accounts() {
            debug!(
                "{} account {}: {} projects, {:.2} total",
                self.policy.category,
                account,
                projects.len(),
                projects.values().sum::<f64>()
            );
        }

        total
    }
}
