//! Ledger record ingestion.
//!
//! Raw supplier payloads are decoded one record at a time into typed shapes and then folded
//! into the uniform [`LedgerTransaction`] / [`LedgerLine`] model every classifier works on.
//! A record that fails to decode is skipped with a warning; its siblings proceed.

use crate::error::{FinancialFlowError, Result};
use crate::schema::DateWindow;
use crate::utils::{parse_amount, parse_iso_date};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransactionKind {
    Invoice,
    SalesReceipt,
    JournalEntry,
    Bill,
    Purchase,
}

impl TransactionKind {
    /// Entity name used by the accounting API query language.
    pub fn entity_name(&self) -> &'static str {
        match self {
            TransactionKind::Invoice => "Invoice",
            TransactionKind::SalesReceipt => "SalesReceipt",
            TransactionKind::JournalEntry => "JournalEntry",
            TransactionKind::Bill => "Bill",
            TransactionKind::Purchase => "Purchase",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.entity_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PostingType {
    Debit,
    Credit,
    #[default]
    Unknown,
}

impl PostingType {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "debit" => PostingType::Debit,
            "credit" => PostingType::Credit,
            _ => PostingType::Unknown,
        }
    }
}

fn deserialize_posting_type<'de, D>(deserializer: D) -> std::result::Result<PostingType, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .as_deref()
        .map(PostingType::parse)
        .unwrap_or_default())
}

/// Accepts amounts sent as JSON numbers or as formatted strings.
fn deserialize_amount<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("amount is not representable as f64")),
        Some(Value::String(s)) => Ok(parse_amount(&s)),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a number or numeric string, got {}",
            other
        ))),
    }
}

/// A `{name, value}` reference as the accounting API emits for customers, vendors,
/// accounts and classes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl Reference {
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

fn reference_name(reference: &Option<Reference>) -> Option<String> {
    reference
        .as_ref()
        .and_then(Reference::display_name)
        .map(str::to_string)
}

fn non_empty(text: &Option<String>) -> Option<String> {
    text.as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Invoices and sales receipts share one shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SalesDocument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub txn_date: Option<String>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub total_amt: f64,
    #[serde(default)]
    pub customer_ref: Option<Reference>,
    #[serde(default)]
    pub txn_type: Option<String>,
    #[serde(default)]
    pub doc_number: Option<String>,
    #[serde(default)]
    pub private_note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JournalEntity {
    #[serde(default)]
    pub entity_ref: Option<Reference>,
    #[serde(default, rename = "Type")]
    pub entity_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JournalEntryLineDetail {
    #[serde(default, deserialize_with = "deserialize_posting_type")]
    pub posting_type: PostingType,
    #[serde(default)]
    pub account_ref: Option<Reference>,
    #[serde(default)]
    pub class_ref: Option<Reference>,
    #[serde(default)]
    pub entity: Option<JournalEntity>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JournalEntryLine {
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub entity: Option<JournalEntity>,
    #[serde(default)]
    pub journal_entry_line_detail: Option<JournalEntryLineDetail>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JournalEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub txn_date: Option<String>,
    #[serde(default)]
    pub doc_number: Option<String>,
    #[serde(default)]
    pub private_note: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub line: Vec<JournalEntryLine>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpenseLineDetail {
    #[serde(default)]
    pub account_ref: Option<Reference>,
    #[serde(default)]
    pub customer_ref: Option<Reference>,
    #[serde(default)]
    pub class_ref: Option<Reference>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpenseLine {
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub detail_type: Option<String>,
    #[serde(default)]
    pub account_based_expense_line_detail: Option<ExpenseLineDetail>,
    #[serde(default)]
    pub expense_line_detail: Option<ExpenseLineDetail>,
}

impl ExpenseLine {
    fn detail(&self) -> Option<&ExpenseLineDetail> {
        self.account_based_expense_line_detail
            .as_ref()
            .or(self.expense_line_detail.as_ref())
    }
}

/// Bills and expense/purchase transactions share one shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpenseDocument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub txn_date: Option<String>,
    #[serde(default)]
    pub doc_number: Option<String>,
    #[serde(default)]
    pub private_note: Option<String>,
    #[serde(default)]
    pub customer_ref: Option<Reference>,
    #[serde(default)]
    pub vendor_ref: Option<Reference>,
    /// Purchases name their payee here rather than in `VendorRef`.
    #[serde(default)]
    pub entity_ref: Option<Reference>,
    /// Card refunds are purchases flagged as credits.
    #[serde(default)]
    pub credit: Option<bool>,
    #[serde(default)]
    pub line: Vec<ExpenseLine>,
}

/// One ledger line in the uniform shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerLine {
    pub account: Option<String>,
    pub amount: f64,
    pub posting: PostingType,
    pub entity: Option<String>,
    pub class: Option<String>,
    pub description: Option<String>,
    /// True for account-based expense lines on bills and purchases.
    pub account_based: bool,
}

/// One ledger transaction in the uniform shape, regardless of source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub kind: TransactionKind,
    pub id: Option<String>,
    pub date: Option<NaiveDate>,
    pub doc_number: Option<String>,
    pub txn_type: Option<String>,
    pub total: f64,
    pub customer: Option<String>,
    pub vendor: Option<String>,
    /// Transaction-level private note and/or description.
    pub note: Option<String>,
    pub lines: Vec<LedgerLine>,
}

impl LedgerTransaction {
    pub fn label(&self) -> String {
        match (&self.id, &self.doc_number) {
            (Some(id), Some(doc)) => format!("{} {} (#{})", self.kind, id, doc),
            (Some(id), None) => format!("{} {}", self.kind, id),
            (None, Some(doc)) => format!("{} #{}", self.kind, doc),
            (None, None) => self.kind.to_string(),
        }
    }
}

fn parse_txn_date(
    kind: TransactionKind,
    id: &Option<String>,
    txn_date: &Option<String>,
) -> Result<Option<NaiveDate>> {
    match non_empty(txn_date) {
        None => Ok(None),
        Some(raw) => parse_iso_date(&raw)
            .map(Some)
            .map_err(|e| FinancialFlowError::MalformedRecord {
                kind: kind.to_string(),
                id: id.clone(),
                details: e.to_string(),
            }),
    }
}

impl SalesDocument {
    pub fn into_transaction(self, kind: TransactionKind) -> Result<LedgerTransaction> {
        let date = parse_txn_date(kind, &self.id, &self.txn_date)?;
        Ok(LedgerTransaction {
            kind,
            date,
            customer: reference_name(&self.customer_ref),
            doc_number: non_empty(&self.doc_number),
            txn_type: non_empty(&self.txn_type),
            total: self.total_amt,
            vendor: None,
            note: non_empty(&self.private_note),
            lines: Vec::new(),
            id: self.id,
        })
    }
}

impl JournalEntry {
    pub fn into_transaction(self) -> Result<LedgerTransaction> {
        let kind = TransactionKind::JournalEntry;
        let date = parse_txn_date(kind, &self.id, &self.txn_date)?;

        let note = match (non_empty(&self.private_note), non_empty(&self.description)) {
            (Some(note), Some(desc)) if note != desc => Some(format!("{} {}", note, desc)),
            (Some(note), _) => Some(note),
            (None, desc) => desc,
        };

        let lines: Vec<LedgerLine> = self
            .line
            .into_iter()
            .filter_map(|line| {
                let detail = line.journal_entry_line_detail?;
                let entity = detail
                    .entity
                    .as_ref()
                    .or(line.entity.as_ref())
                    .and_then(|e| reference_name(&e.entity_ref));
                Some(LedgerLine {
                    account: reference_name(&detail.account_ref),
                    amount: line.amount,
                    posting: detail.posting_type,
                    entity,
                    class: reference_name(&detail.class_ref),
                    description: non_empty(&line.description),
                    account_based: false,
                })
            })
            .collect();

        let total = lines
            .iter()
            .filter(|l| l.posting == PostingType::Debit)
            .map(|l| l.amount)
            .sum();

        Ok(LedgerTransaction {
            kind,
            date,
            doc_number: non_empty(&self.doc_number),
            txn_type: Some(kind.entity_name().to_string()),
            total,
            customer: None,
            vendor: None,
            note,
            lines,
            id: self.id,
        })
    }
}

impl ExpenseDocument {
    pub fn into_transaction(self, kind: TransactionKind) -> Result<LedgerTransaction> {
        let date = parse_txn_date(kind, &self.id, &self.txn_date)?;
        let posting = if self.credit.unwrap_or(false) {
            PostingType::Credit
        } else {
            PostingType::Unknown
        };

        let lines: Vec<LedgerLine> = self
            .line
            .iter()
            .filter_map(|line| {
                let detail = line.detail()?;
                let account_based = line.account_based_expense_line_detail.is_some()
                    || line.detail_type.as_deref() == Some("AccountBasedExpenseLineDetail");
                Some(LedgerLine {
                    account: reference_name(&detail.account_ref),
                    amount: line.amount,
                    posting,
                    entity: reference_name(&detail.customer_ref),
                    class: reference_name(&detail.class_ref),
                    description: non_empty(&line.description),
                    account_based,
                })
            })
            .collect();

        Ok(LedgerTransaction {
            kind,
            date,
            doc_number: non_empty(&self.doc_number),
            txn_type: Some(kind.entity_name().to_string()),
            total: lines.iter().map(|l| l.amount).sum(),
            customer: reference_name(&self.customer_ref),
            vendor: reference_name(&self.vendor_ref).or_else(|| reference_name(&self.entity_ref)),
            note: non_empty(&self.private_note),
            lines,
            id: self.id,
        })
    }
}

fn decode<T: DeserializeOwned>(kind: TransactionKind, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| FinancialFlowError::MalformedRecord {
        kind: kind.to_string(),
        id: value
            .get("Id")
            .and_then(Value::as_str)
            .map(str::to_string),
        details: e.to_string(),
    })
}

/// Decodes a single raw record of the given kind.
pub fn decode_record(kind: TransactionKind, value: &Value) -> Result<LedgerTransaction> {
    match kind {
        TransactionKind::Invoice | TransactionKind::SalesReceipt => {
            decode::<SalesDocument>(kind, value)?.into_transaction(kind)
        }
        TransactionKind::JournalEntry => decode::<JournalEntry>(kind, value)?.into_transaction(),
        TransactionKind::Bill | TransactionKind::Purchase => {
            decode::<ExpenseDocument>(kind, value)?.into_transaction(kind)
        }
    }
}

/// Decodes every record, skipping malformed ones, undated ones and records dated outside
/// `window`.
pub fn decode_records(
    kind: TransactionKind,
    values: &[Value],
    window: &DateWindow,
) -> Vec<LedgerTransaction> {
    let mut transactions = Vec::with_capacity(values.len());

    for value in values {
        match decode_record(kind, value) {
            Ok(txn) => {
                match txn.date {
                    Some(date) if window.contains(date) => transactions.push(txn),
                    Some(date) => {
                        debug!("Skipping {} dated {} outside window", txn.label(), date)
                    }
                    None => debug!("Skipping undated {}", txn.label()),
                }
            }
            Err(e) => warn!("Skipping record: {}", e),
        }
    }

    debug!(
        "Decoded {} of {} {} records",
        transactions.len(),
        values.len(),
        kind
    );
    transactions
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_invoice() {
        let value = json!({
            "Id": "17",
            "TxnDate": "2024-03-05",
            "TotalAmt": 1500,
            "CustomerRef": {"name": "Parent:A6 CIE", "value": "58"},
            "DocNumber": "INV-1001"
        });
        let txn = decode_record(TransactionKind::Invoice, &value).unwrap();
        assert_eq!(txn.kind, TransactionKind::Invoice);
        assert_eq!(txn.total, 1500.0);
        assert_eq!(txn.customer.as_deref(), Some("Parent:A6 CIE"));
        assert_eq!(txn.date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(txn.label(), "Invoice 17 (#INV-1001)");
    }

    #[test]
    fn test_decode_amount_strings() {
        let value = json!({"Id": "3", "TotalAmt": "2,500.00", "CustomerRef": {"name": "CDSP"}});
        let txn = decode_record(TransactionKind::SalesReceipt, &value).unwrap();
        assert_eq!(txn.total, 2500.0);
    }

    #[test]
    fn test_decode_journal_entry_lines() {
        let value = json!({
            "Id": "88",
            "TxnDate": "2024-04-30",
            "DocNumber": "JE-44",
            "PrivateNote": "April payroll allocation",
            "Line": [
                {
                    "Amount": 3000,
                    "Description": "CIE team",
                    "JournalEntryLineDetail": {
                        "PostingType": "Debit",
                        "AccountRef": {"name": "5001 Salaries & wages"},
                        "ClassRef": {"name": "03 Product"},
                        "Entity": {"EntityRef": {"name": "A6 CIE"}, "Type": "Customer"}
                    }
                },
                {
                    "Amount": 3000,
                    "Entity": {"EntityRef": {"name": "Payroll Clearing"}},
                    "JournalEntryLineDetail": {
                        "PostingType": "Credit",
                        "AccountRef": {"name": "2100 Payroll Liabilities"}
                    }
                },
                {"Amount": 0, "DetailType": "DescriptionOnly"}
            ]
        });
        let txn = decode_record(TransactionKind::JournalEntry, &value).unwrap();
        assert_eq!(txn.lines.len(), 2);
        assert_eq!(txn.lines[0].posting, PostingType::Debit);
        assert_eq!(txn.lines[0].entity.as_deref(), Some("A6 CIE"));
        assert_eq!(txn.lines[0].class.as_deref(), Some("03 Product"));
        assert_eq!(txn.lines[1].posting, PostingType::Credit);
        assert_eq!(txn.lines[1].entity.as_deref(), Some("Payroll Clearing"));
        assert_eq!(txn.total, 3000.0);
        assert_eq!(txn.note.as_deref(), Some("April payroll allocation"));
    }

    #[test]
    fn test_decode_bill_and_purchase() {
        let bill = json!({
            "Id": "5",
            "TxnDate": "2024-02-10",
            "VendorRef": {"name": "Jane Contractor LLC"},
            "Line": [{
                "Amount": 1200.5,
                "DetailType": "AccountBasedExpenseLineDetail",
                "AccountBasedExpenseLineDetail": {
                    "AccountRef": {"name": "5011 Direct 1099 Labor"},
                    "CustomerRef": {"name": "CDSP"},
                    "ClassRef": {"name": "03 Product"}
                }
            }]
        });
        let txn = decode_record(TransactionKind::Bill, &bill).unwrap();
        assert_eq!(txn.vendor.as_deref(), Some("Jane Contractor LLC"));
        assert!(txn.lines[0].account_based);
        assert_eq!(txn.lines[0].entity.as_deref(), Some("CDSP"));
        assert_eq!(txn.lines[0].posting, PostingType::Unknown);

        let refund = json!({
            "Id": "9",
            "Credit": true,
            "EntityRef": {"name": "Card Vendor"},
            "Line": [{
                "Amount": 50,
                "ExpenseLineDetail": {"AccountRef": {"name": "6400 Software"}}
            }]
        });
        let txn = decode_record(TransactionKind::Purchase, &refund).unwrap();
        assert_eq!(txn.vendor.as_deref(), Some("Card Vendor"));
        assert_eq!(txn.lines[0].posting, PostingType::Credit);
        assert!(!txn.lines[0].account_based);
    }

    #[test]
    fn test_decode_records_skips_malformed_undated_and_out_of_window() {
        let values = vec![
            json!({"Id": "1", "TxnDate": "2024-05-01", "TotalAmt": 10}),
            json!({"Id": "2", "TxnDate": "not a date", "TotalAmt": 10}),
            json!({"Id": "3", "TxnDate": "2023-05-01", "TotalAmt": 10}),
            json!({"Id": "4", "TotalAmt": {"nested": true}}),
            json!({"Id": "5", "TotalAmt": 10}),
            json!("garbage"),
        ];
        let txns = decode_records(TransactionKind::Invoice, &values, &window());
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].id.as_deref(), Some("1"));
    }

    #[test]
    fn test_posting_type_parse() {
        assert_eq!(PostingType::parse("Debit"), PostingType::Debit);
        assert_eq!(PostingType::parse(" credit "), PostingType::Credit);
        assert_eq!(PostingType::parse(""), PostingType::Unknown);
    }
}
