//! Line eligibility and project resolution for the project-attributed expense accounts.
//!
//! COGS and G&A differ only in their [`AggregationPolicy`]: which accounts they target, how
//! the class reference partitions lines between them and which posting direction counts.

use crate::accounts::{infer_account_number, is_ga_class};
use crate::normalizer::ProjectNormalizer;
use crate::records::{LedgerLine, LedgerTransaction, PostingType, TransactionKind};
use crate::schema::{FlowConfig, UNASSIGNED};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

/// Internal allocation codes such as `9-overhead` or `9-general & administrative`.
static INTERNAL_ALLOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[\s(:,/])9-[a-z&]").expect("hardcoded regex should be valid")
});

/// Contractor labor account on which the vendor fallback applies.
const CONTRACTOR_LABOR_ACCOUNT: &str = "5011";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseCategory {
    Cogs,
    GeneralAdministrative,
}

impl std::fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpenseCategory::Cogs => f.write_str("COGS"),
            ExpenseCategory::GeneralAdministrative => f.write_str("G&A"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassRule {
    /// Any class except a G&A one; an absent class is accepted.
    ExcludeGa,
    /// A G&A class, or no class at all.
    RequireGaOrAbsent,
}

impl ClassRule {
    pub fn accepts(&self, class: Option<&str>) -> bool {
        match (self, class) {
            (ClassRule::ExcludeGa, Some(class)) => !is_ga_class(class),
            (ClassRule::ExcludeGa, None) => true,
            (ClassRule::RequireGaOrAbsent, Some(class)) => is_ga_class(class),
            (ClassRule::RequireGaOrAbsent, None) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationPolicy {
    pub category: ExpenseCategory,
    pub target_accounts: BTreeSet<String>,
    pub class_rule: ClassRule,
    /// Posting direction a journal-entry line needs to count.
    pub posting: PostingType,
    pub exclude_internal_allocations: bool,
}

impl AggregationPolicy {
    pub fn cogs(config: &FlowConfig) -> Self {
        Self {
            category: ExpenseCategory::Cogs,
            target_accounts: config.target_cogs_accounts.clone(),
            class_rule: ClassRule::ExcludeGa,
            posting: PostingType::Debit,
            exclude_internal_allocations: true,
        }
    }

    pub fn general_administrative(config: &FlowConfig) -> Self {
        Self {
            category: ExpenseCategory::GeneralAdministrative,
            target_accounts: config.target_ga_accounts.clone(),
            class_rule: ClassRule::RequireGaOrAbsent,
            posting: PostingType::Debit,
            exclude_internal_allocations: false,
        }
    }

    /// Journal entries must match the policy's posting type exactly. Bills and purchases
    /// carry no posting type and count unless they were ingested as credits.
    fn accepts_posting(&self, kind: TransactionKind, posting: PostingType) -> bool {
        match kind {
            TransactionKind::JournalEntry => posting == self.posting,
            _ => posting == self.posting || posting == PostingType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedKind,
    ZeroAmount,
    NotAccountBased,
    NoAccountNumber,
    NotTargetAccount,
    Posting,
    ClassPartition,
    InternalAllocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineDecision {
    Eligible { account_number: String },
    Skipped(SkipReason),
}

/// Decides whether a line contributes to one of the policy's target accounts.
pub fn classify_line(
    policy: &AggregationPolicy,
    txn: &LedgerTransaction,
    line: &LedgerLine,
) -> LineDecision {
    use LineDecision::Skipped;

    match txn.kind {
        TransactionKind::JournalEntry | TransactionKind::Bill | TransactionKind::Purchase => {}
        _ => return Skipped(SkipReason::UnsupportedKind),
    }

    if line.amount == 0.0 {
        return Skipped(SkipReason::ZeroAmount);
    }

    if txn.kind != TransactionKind::JournalEntry && !line.account_based {
        return Skipped(SkipReason::NotAccountBased);
    }

    let Some(account_number) = line.account.as_deref().and_then(infer_account_number) else {
        return Skipped(SkipReason::NoAccountNumber);
    };

    if !policy.target_accounts.contains(&account_number) {
        return Skipped(SkipReason::NotTargetAccount);
    }

    if !policy.accepts_posting(txn.kind, line.posting) {
        return Skipped(SkipReason::Posting);
    }

    if !policy.class_rule.accepts(line.class.as_deref()) {
        return Skipped(SkipReason::ClassPartition);
    }

    if policy.exclude_internal_allocations
        && line
            .description
            .as_deref()
            .is_some_and(is_internal_allocation)
    {
        return Skipped(SkipReason::InternalAllocation);
    }

    LineDecision::Eligible { account_number }
}

pub fn is_internal_allocation(description: &str) -> bool {
    INTERNAL_ALLOCATION.is_match(description)
}

/// Where a line's project came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectSource {
    LineEntity,
    TransactionCustomer,
    LineDescription,
    TransactionNote,
    Vendor,
    Unassigned,
}

const RESOLUTION_ORDER: [ProjectSource; 5] = [
    ProjectSource::LineEntity,
    ProjectSource::TransactionCustomer,
    ProjectSource::LineDescription,
    ProjectSource::TransactionNote,
    ProjectSource::Vendor,
];

/// Resolves the project of an eligible line by walking [`RESOLUTION_ORDER`]; the first
/// source that yields a project wins and `Unassigned` closes the chain.
pub struct ProjectResolver<'a> {
    normalizer: &'a ProjectNormalizer,
    vendor_vetoes: &'a BTreeMap<String, Vec<String>>,
}

impl<'a> ProjectResolver<'a> {
    pub fn new(
        normalizer: &'a ProjectNormalizer,
        vendor_vetoes: &'a BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            normalizer,
            vendor_vetoes,
        }
    }

    pub fn resolve(
        &self,
        txn: &LedgerTransaction,
        line: &LedgerLine,
        account_number: &str,
    ) -> (String, ProjectSource) {
        RESOLUTION_ORDER
            .iter()
            .find_map(|source| {
                self.try_source(*source, txn, line, account_number)
                    .map(|project| (project, *source))
            })
            .unwrap_or_else(|| (UNASSIGNED.to_string(), ProjectSource::Unassigned))
    }

    fn try_source(
        &self,
        source: ProjectSource,
        txn: &LedgerTransaction,
        line: &LedgerLine,
        account_number: &str,
    ) -> Option<String> {
        match source {
            ProjectSource::LineEntity => line
                .entity
                .as_deref()
                .and_then(|name| self.normalizer.normalize(name)),
            ProjectSource::TransactionCustomer => txn
                .customer
                .as_deref()
                .and_then(|name| self.normalizer.normalize(name)),
            ProjectSource::LineDescription => line
                .description
                .as_deref()
                .and_then(|text| self.normalizer.extract_from_description(text)),
            ProjectSource::TransactionNote => txn
                .note
                .as_deref()
                .and_then(|text| self.normalizer.extract_from_description(text)),
            ProjectSource::Vendor => self.vendor_project(txn, account_number),
            ProjectSource::Unassigned => None,
        }
    }

    fn vendor_project(&self, txn: &LedgerTransaction, account_number: &str) -> Option<String> {
        let vendor_driven =
            account_number == CONTRACTOR_LABOR_ACCOUNT || txn.kind == TransactionKind::Bill;
        if !vendor_driven {
            return None;
        }

        let vendor = txn.vendor.as_deref()?;
        let project = self.normalizer.match_registered(vendor)?;

        let vetoed = self
            .vendor_vetoes
            .get(account_number)
            .is_some_and(|vetoes| vetoes.iter().any(|v| v.eq_ignore_ascii_case(&project)));
        if vetoed {
            debug!(
                "Vendor '{}' may not resolve to '{}' on account {}",
                vendor, project, account_number
            );
            return None;
        }

        Some(project)
    }
}
