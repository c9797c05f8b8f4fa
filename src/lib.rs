//! # Financial Flow Builder
//!
//! A library for turning one company's raw accounting ledger (invoices, sales receipts,
//! journal entries, bills, purchases and a profit and loss report) into a normalized
//! financial-flow model for Sankey visualization.
//!
//! ## Core Concepts
//!
//! - **Project income**: invoices, sales receipts and revenue journal lines grouped by
//!   canonical project, falling back to the report's income rows
//! - **Expense hierarchy**: the report's expense sections as primary / secondary / tertiary
//!   nodes with totals computed bottom-up
//! - **Project attribution**: per-project sums for the designated COGS and G&A leaf accounts,
//!   attached to the matching secondaries
//! - **Totality**: a request always yields a [`FinancialFlow`]; failed fetches and malformed
//!   records are logged and skipped
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_flow_builder::*;
//! use chrono::NaiveDate;
//!
//! let config = FlowConfig::new(
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
//! );
//! let snapshot = LedgerSnapshot::from_path("ledger.json")?;
//!
//! let flow = process_financial_flow(&config, &snapshot);
//! println!("{}", flow.to_markdown());
//! ```

pub mod accounts;
pub mod classifier;
pub mod error;
pub mod flow;
pub mod grouping;
pub mod hierarchy;
pub mod income;
pub mod integrator;
pub mod normalizer;
pub mod project_expenses;
pub mod records;
pub mod report;
pub mod schema;
pub mod source;
pub mod summary;
pub mod utils;
pub mod verification;

pub use accounts::{extract_account_number, infer_account_number, is_ga_class, is_revenue_account};
pub use classifier::{
    classify_line, AggregationPolicy, ClassRule, ExpenseCategory, LineDecision, ProjectResolver,
    ProjectSource, SkipReason,
};
pub use error::{FinancialFlowError, Result};
pub use flow::FinancialFlow;
pub use grouping::group_small_expenses;
pub use hierarchy::{ExpenseHierarchy, PrimaryNode, SecondaryNode};
pub use income::{IncomeAggregator, IncomeBreakdown, IncomeSourceType};
pub use integrator::{HierarchyIntegrator, IntegrationReport};
pub use normalizer::ProjectNormalizer;
pub use project_expenses::{ExpenseAttribution, ProjectExpenseAggregator, ProjectExpenses};
pub use records::{decode_record, decode_records, LedgerLine, LedgerTransaction, PostingType, TransactionKind};
pub use report::{parse_report_rows, ParsedReport, ReportParser, ReportRow};
pub use schema::*;
pub use source::{company_name, LedgerSnapshot, LedgerSource};
pub use verification::{verify_flow, FlowVerifier, VerificationResult};

use log::{debug, error, info, warn};
use serde_json::Value;

pub struct FinancialFlowProcessor;

impl FinancialFlowProcessor {
    /// Runs one request against `source`. Never fails: every error is logged and degrades to
    /// empty input for the affected source, or to a zeroed result.
    pub fn process<S: LedgerSource>(config: &FlowConfig, source: &S) -> FinancialFlow {
        let window = config.window();
        if let Err(e) = config.validate() {
            error!("Cannot build financial flow: {}", e);
            return FinancialFlow::empty(window);
        }

        info!(
            "Building financial flow for {} to {}",
            window.start, window.end
        );

        let normalizer = ProjectNormalizer::new(&config.projects);

        let company = match source.company_info() {
            Ok(info) => info.as_ref().and_then(company_name),
            Err(e) => {
                warn!("{}; continuing without company name", e);
                None
            }
        };

        let invoices = fetch_records(source, TransactionKind::Invoice, &window);
        let receipts = fetch_records(source, TransactionKind::SalesReceipt, &window);
        let income_entries = fetch_records(source, TransactionKind::JournalEntry, &window);
        let report = fetch_report(source, config);

        let cogs = Self::project_expenses(AggregationPolicy::cogs(config), config, &normalizer, source);
        let ga = Self::project_expenses(
            AggregationPolicy::general_administrative(config),
            config,
            &normalizer,
            source,
        );

        let breakdown =
            IncomeAggregator::new(&normalizer).aggregate(&invoices, &receipts, &income_entries);
        let mut income = breakdown.merged();
        let mut income_source_type = IncomeSourceType::Projects;

        if income.is_empty() {
            match &report {
                Some(parsed) if !parsed.income.is_empty() => {
                    info!(
                        "No project income found; using {} income rows from the report",
                        parsed.income.len()
                    );
                    income = parsed.income.clone();
                    income_source_type = IncomeSourceType::Accounts;
                }
                Some(_) => debug!("No income from transactions or report"),
                None => {
                    error!("No profit and loss report and no transaction income; returning an empty flow");
                    let mut empty = FinancialFlow::empty(window);
                    empty.company_name = company;
                    return empty;
                }
            }
        }

        let mut hierarchy = report.map(|parsed| parsed.hierarchy).unwrap_or_default();

        let mut project_expenses = cogs;
        project_expenses.merge(&ga);

        let targets = config.target_accounts();
        HierarchyIntegrator::new(&targets, config.attribution_tolerance)
            .with_unallocated_residual(config.attach_unallocated_residual)
            .integrate(&mut hierarchy, &project_expenses);

        let flow = FinancialFlow::assemble(
            window,
            company,
            income,
            income_source_type,
            hierarchy,
            project_expenses.keyed_by_display_name(config),
        );

        info!(
            "Financial flow: revenue {:.2}, expenses {:.2}, net income {:.2} ({:?} income)",
            flow.total_revenue, flow.total_expenses, flow.net_income, flow.income_source_type
        );
        flow
    }

    /// Like [`FinancialFlowProcessor::process`], then checks the result's invariants.
    pub fn process_with_verification<S: LedgerSource>(
        config: &FlowConfig,
        source: &S,
        tolerance: f64,
    ) -> Result<FinancialFlow> {
        let flow = Self::process(config, source);

        FlowVerifier::new(tolerance, config.attribution_tolerance).verify_strict(&flow)?;

        Ok(flow)
    }

    /// Entry point for a dashboard request with optional `YYYY-MM-DD` dates.
    pub fn process_request<S: LedgerSource>(
        start_date: Option<&str>,
        end_date: Option<&str>,
        source: &S,
    ) -> FinancialFlow {
        let today = chrono::Local::now().date_naive();
        match FlowConfig::for_request(start_date, end_date, today) {
            Ok(config) => Self::process(&config, source),
            Err(e) => {
                error!("Invalid request dates: {}", e);
                FinancialFlow::empty(FlowConfig::default().window())
            }
        }
    }

    fn project_expenses<S: LedgerSource>(
        policy: AggregationPolicy,
        config: &FlowConfig,
        normalizer: &ProjectNormalizer,
        source: &S,
    ) -> ProjectExpenses {
        let window = config.window();
        let journal_entries = fetch_records(source, TransactionKind::JournalEntry, &window);
        let bills = fetch_records(source, TransactionKind::Bill, &window);
        let purchases = fetch_records(source, TransactionKind::Purchase, &window);

        ProjectExpenseAggregator::new(
            policy,
            ProjectResolver::new(normalizer, &config.vendor_vetoes),
        )
        .aggregate(&journal_entries, &bills, &purchases)
    }
}

fn fetch_records<S: LedgerSource>(
    source: &S,
    kind: TransactionKind,
    window: &DateWindow,
) -> Vec<LedgerTransaction> {
    match source.query(kind, window) {
        Ok(values) => decode_records(kind, &values, window),
        Err(e) => {
            warn!("{}; continuing without {} records", e, kind);
            Vec::new()
        }
    }
}

fn fetch_report<S: LedgerSource>(source: &S, config: &FlowConfig) -> Option<ParsedReport> {
    let payload: Option<Value> = match source.profit_and_loss(&config.window()) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("{}", e);
            None
        }
    };

    let Some(payload) = payload else {
        warn!(
            "{}",
            crate::source::transport_error("ProfitAndLoss", "no report returned")
        );
        return None;
    };

    match ReportParser::new(&config.report_name_rewrites).parse(&payload) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("{}; continuing without report", e);
            None
        }
    }
}

pub fn process_financial_flow<S: LedgerSource>(config: &FlowConfig, source: &S) -> FinancialFlow {
    FinancialFlowProcessor::process(config, source)
}

pub fn process_with_verification<S: LedgerSource>(
    config: &FlowConfig,
    source: &S,
    tolerance: f64,
) -> Result<FinancialFlow> {
    FinancialFlowProcessor::process_with_verification(config, source, tolerance)
}
