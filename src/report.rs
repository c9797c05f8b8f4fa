//! Profit and loss report parsing.
//!
//! The report arrives as a tree of `{Header, Rows: {Row: [...]}, Summary, type, group}` nodes
//! whose leaves carry `ColData: [{value: name}, {value: amount}]`. It is first decoded into
//! [`ReportRow`]s and then folded into a flat income map plus the [`ExpenseHierarchy`].

use crate::accounts::{extract_account_number, rewrite_display_name};
use crate::error::{FinancialFlowError, Result};
use crate::hierarchy::{ExpenseHierarchy, PrimaryNode, SecondaryNode};
use crate::utils::{parse_amount, sum_values};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

const INCOME_SKIP_WORDS: [&str; 4] = ["total", "subtotal", "net income", "gross profit"];

#[derive(Debug, Clone, PartialEq)]
pub enum ReportRow {
    Section {
        header: String,
        group: Option<String>,
        children: Vec<ReportRow>,
        summary: Option<f64>,
    },
    Data {
        name: String,
        amount: f64,
    },
}

impl ReportRow {
    pub fn name(&self) -> &str {
        match self {
            ReportRow::Section { header, .. } => header,
            ReportRow::Data { name, .. } => name,
        }
    }

    /// Every data row below this one, depth first.
    pub fn data_rows(&self) -> Vec<(&str, f64)> {
        let mut rows = Vec::new();
        self.collect_data_rows(&mut rows);
        rows
    }

    fn collect_data_rows<'a>(&'a self, rows: &mut Vec<(&'a str, f64)>) {
        match self {
            ReportRow::Data { name, amount } => rows.push((name.as_str(), *amount)),
            ReportRow::Section {
                header, group, ..
            } if is_other_expenses(header, group.as_deref()) => {}
            ReportRow::Section { children, .. } => {
                for child in children {
                    child.collect_data_rows(rows);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawColumn {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawColumns {
    #[serde(rename = "ColData", default)]
    col_data: Vec<RawColumn>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawRows {
    #[serde(rename = "Row", default)]
    row: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRow {
    #[serde(rename = "Header", default)]
    header: Option<RawColumns>,
    #[serde(rename = "Rows", default)]
    rows: Option<RawRows>,
    #[serde(rename = "Summary", default)]
    summary: Option<RawColumns>,
    #[serde(rename = "ColData", default)]
    col_data: Vec<RawColumn>,
    #[serde(rename = "type", default)]
    row_type: Option<String>,
    #[serde(default)]
    group: Option<String>,
}

fn column_text(columns: &[RawColumn], index: usize) -> Option<String> {
    columns
        .get(index)
        .and_then(|c| c.value.as_deref())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn decode_rows(values: &[Value]) -> Vec<ReportRow> {
    values
        .iter()
        .filter_map(|value| match RawRow::deserialize(value) {
            Ok(raw) => raw.into_row(),
            Err(e) => {
                warn!("Skipping malformed report row: {}", e);
                None
            }
        })
        .collect()
}

impl RawRow {
    fn into_row(self) -> Option<ReportRow> {
        let is_section = self.rows.is_some()
            || self
                .row_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case("section"));

        if is_section {
            let header = self
                .header
                .as_ref()
                .and_then(|h| column_text(&h.col_data, 0))
                .or_else(|| self.group.clone())
                .unwrap_or_default();
            let children = self
                .rows
                .as_ref()
                .map(|rows| decode_rows(&rows.row))
                .unwrap_or_default();
            let summary = self
                .summary
                .as_ref()
                .and_then(|s| column_text(&s.col_data, 1))
                .map(|amount| parse_amount(&amount));
            return Some(ReportRow::Section {
                header,
                group: self.group,
                children,
                summary,
            });
        }

        let name = column_text(&self.col_data, 0)?;
        let amount = column_text(&self.col_data, 1)
            .map(|amount| parse_amount(&amount))
            .unwrap_or(0.0);
        Some(ReportRow::Data { name, amount })
    }
}

/// Top-level rows of a report payload, accepting the `QueryResponse.Report`, `Report` and bare
/// envelopes.
pub fn parse_report_rows(report: &Value) -> Result<Vec<ReportRow>> {
    let rows = report
        .pointer("/QueryResponse/Report/Rows")
        .or_else(|| report.pointer("/Report/Rows"))
        .or_else(|| report.get("Rows"))
        .ok_or_else(|| FinancialFlowError::MalformedReport("missing Rows".to_string()))?;

    let rows: RawRows = RawRows::deserialize(rows)
        .map_err(|e| FinancialFlowError::MalformedReport(e.to_string()))?;

    Ok(decode_rows(&rows.row))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopLevelSection {
    Income,
    CostOfGoodsSold,
    Expenses,
    OtherIncome,
    OtherExpenses,
    /// Computed lines such as gross profit and net income.
    Derived,
}

pub fn classify_section(header: &str, group: Option<&str>) -> TopLevelSection {
    match group.map(str::trim) {
        Some("Income") => return TopLevelSection::Income,
        Some("COGS") => return TopLevelSection::CostOfGoodsSold,
        Some("Expenses") => return TopLevelSection::Expenses,
        Some("OtherIncome") => return TopLevelSection::OtherIncome,
        Some("OtherExpenses") => return TopLevelSection::OtherExpenses,
        Some("GrossProfit" | "NetOperatingIncome" | "NetOtherIncome" | "NetIncome") => {
            return TopLevelSection::Derived
        }
        _ => {}
    }

    let header = header.trim().to_lowercase();
    if header.contains("other expense") {
        TopLevelSection::OtherExpenses
    } else if header.contains("other income") {
        TopLevelSection::OtherIncome
    } else if header.contains("cost of goods sold")
        || header.contains("cost of sales")
        || header == "cogs"
    {
        TopLevelSection::CostOfGoodsSold
    } else if header.starts_with("net ") || header.contains("gross profit") {
        TopLevelSection::Derived
    } else if header.contains("income") || header.contains("revenue") {
        TopLevelSection::Income
    } else if header.contains("expense") {
        TopLevelSection::Expenses
    } else {
        TopLevelSection::Derived
    }
}

/// Income rows and expense hierarchy read from one report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReport {
    pub income: BTreeMap<String, f64>,
    pub hierarchy: ExpenseHierarchy,
}

impl ParsedReport {
    pub fn total_income(&self) -> f64 {
        sum_values(&self.income)
    }
}

pub struct ReportParser<'a> {
    rewrites: &'a BTreeMap<String, String>,
}

impl<'a> ReportParser<'a> {
    pub fn new(rewrites: &'a BTreeMap<String, String>) -> Self {
        Self { rewrites }
    }

    pub fn parse(&self, report: &Value) -> Result<ParsedReport> {
        let rows = parse_report_rows(report)?;
        Ok(self.parse_rows(&rows))
    }

    pub fn parse_rows(&self, rows: &[ReportRow]) -> ParsedReport {
        let mut parsed = ParsedReport::default();

        for row in rows {
            let ReportRow::Section {
                header,
                group,
                children,
                ..
            } = row
            else {
                debug!("Ignoring top-level data row '{}'", row.name());
                continue;
            };

            match classify_section(header, group.as_deref()) {
                TopLevelSection::Income => self.collect_income(children, &mut parsed.income),
                TopLevelSection::CostOfGoodsSold | TopLevelSection::Expenses => {
                    self.collect_primaries(header, children, &mut parsed.hierarchy)
                }
                TopLevelSection::OtherExpenses | TopLevelSection::OtherIncome => {
                    debug!("Skipping report section '{}'", header);
                }
                TopLevelSection::Derived => {}
            }
        }

        info!(
            "Parsed profit and loss report: {} income rows, {} primary expense groups, {:.2} total expenses",
            parsed.income.len(),
            parsed.hierarchy.primaries.len(),
            parsed.hierarchy.total()
        );
        parsed
    }

    fn collect_income(&self, children: &[ReportRow], income: &mut BTreeMap<String, f64>) {
        for child in children {
            for (name, amount) in child.data_rows() {
                let lower = name.to_lowercase();
                if INCOME_SKIP_WORDS.iter().any(|w| lower.contains(w)) {
                    continue;
                }
                if amount <= 0.0 {
                    if amount < 0.0 {
                        warn!("Dropping negative income row '{}' ({:.2})", name, amount);
                    }
                    continue;
                }
                *income.entry(self.display_name(name)).or_insert(0.0) += amount;
            }
        }
    }

    fn collect_primaries(
        &self,
        section_header: &str,
        children: &[ReportRow],
        hierarchy: &mut ExpenseHierarchy,
    ) {
        let mut loose = PrimaryNode::default();

        for child in children {
            match child {
                ReportRow::Section { header, group, .. }
                    if is_other_expenses(header, group.as_deref()) =>
                {
                    debug!("Skipping nested section '{}'", header);
                }
                ReportRow::Section {
                    header, children, ..
                } if is_primary(header, children) => {
                    let primary = self.build_primary(children);
                    if primary.secondaries.is_empty() {
                        debug!("Dropping empty primary '{}'", header);
                    } else {
                        hierarchy.insert_primary(self.display_name(header), primary);
                    }
                }
                ReportRow::Section { header, .. } => {
                    debug!("Dropping empty section '{}'", header);
                }
                ReportRow::Data { name, amount } => {
                    if let Some(node) = self.data_secondary(name, *amount) {
                        loose.insert_secondary(self.display_name(name), node);
                    }
                }
            }
        }

        if !loose.secondaries.is_empty() {
            hierarchy.insert_primary(self.display_name(section_header), loose);
        }
    }

    fn build_primary(&self, children: &[ReportRow]) -> PrimaryNode {
        let mut primary = PrimaryNode::default();

        for child in children {
            match child {
                ReportRow::Data { name, amount } => {
                    if let Some(node) = self.data_secondary(name, *amount) {
                        primary.insert_secondary(self.display_name(name), node);
                    }
                }
                ReportRow::Section { header, group, .. }
                    if is_other_expenses(header, group.as_deref()) =>
                {
                    debug!("Skipping nested section '{}'", header);
                }
                ReportRow::Section { header, .. } => {
                    let tertiaries = self.tertiaries(child);
                    if tertiaries.is_empty() {
                        debug!("Dropping empty secondary section '{}'", header);
                        continue;
                    }
                    primary.insert_secondary(
                        self.display_name(header),
                        SecondaryNode::from_section(header, tertiaries),
                    );
                }
            }
        }

        primary
    }

    fn data_secondary(&self, name: &str, amount: f64) -> Option<SecondaryNode> {
        (amount != 0.0).then(|| SecondaryNode::from_row(name, amount.abs()))
    }

    /// Flattens every data row under `section`, however deep.
    fn tertiaries(&self, section: &ReportRow) -> BTreeMap<String, f64> {
        let mut tertiaries = BTreeMap::new();
        for (name, amount) in section.data_rows() {
            if amount == 0.0 {
                continue;
            }
            *tertiaries.entry(self.display_name(name)).or_insert(0.0) += amount.abs();
        }
        tertiaries
    }

    fn display_name(&self, name: &str) -> String {
        rewrite_display_name(name, self.rewrites)
    }
}

/// Other Expenses rows are excluded at any depth.
fn is_other_expenses(header: &str, group: Option<&str>) -> bool {
    classify_section(header, group) == TopLevelSection::OtherExpenses
}

/// A section opens a primary when it is a `x000` roll-up account or has rows of its own.
fn is_primary(header: &str, children: &[ReportRow]) -> bool {
    extract_account_number(header).is_some_and(|n| n.ends_with("000")) || !children.is_empty()
}
