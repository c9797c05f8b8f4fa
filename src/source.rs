use crate::error::{FinancialFlowError, Result};
use crate::records::TransactionKind;
use crate::schema::DateWindow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Supplier of raw ledger records for one company.
///
/// Implementations own the transport (authentication, pagination, retries). An `Err` or an
/// absent payload is treated by the engine as empty input for that source.
pub trait LedgerSource {
    /// Free-form company record; only `CompanyName` is read.
    fn company_info(&self) -> Result<Option<Value>>;

    /// Every record of `kind` dated inside `window`.
    fn query(&self, kind: TransactionKind, window: &DateWindow) -> Result<Vec<Value>>;

    /// The profit and loss report covering `window`.
    fn profit_and_loss(&self, window: &DateWindow) -> Result<Option<Value>>;
}

impl<S: LedgerSource + ?Sized> LedgerSource for &S {
    fn company_info(&self) -> Result<Option<Value>> {
        (**self).company_info()
    }

    fn query(&self, kind: TransactionKind, window: &DateWindow) -> Result<Vec<Value>> {
        (**self).query(kind, window)
    }

    fn profit_and_loss(&self, window: &DateWindow) -> Result<Option<Value>> {
        (**self).profit_and_loss(window)
    }
}

/// An in-memory ledger export, e.g. a JSON bundle saved from the accounting API.
///
/// Records are returned as stored; the engine applies the request window itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub company_info: Option<Value>,
    #[serde(default)]
    pub invoices: Vec<Value>,
    #[serde(default)]
    pub sales_receipts: Vec<Value>,
    #[serde(default)]
    pub journal_entries: Vec<Value>,
    #[serde(default)]
    pub bills: Vec<Value>,
    #[serde(default)]
    pub purchases: Vec<Value>,
    #[serde(default)]
    pub profit_and_loss: Option<Value>,
}

impl LedgerSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn records(&self, kind: TransactionKind) -> &[Value] {
        match kind {
            TransactionKind::Invoice => &self.invoices,
            TransactionKind::SalesReceipt => &self.sales_receipts,
            TransactionKind::JournalEntry => &self.journal_entries,
            TransactionKind::Bill => &self.bills,
            TransactionKind::Purchase => &self.purchases,
        }
    }
}

impl LedgerSource for LedgerSnapshot {
    fn company_info(&self) -> Result<Option<Value>> {
        Ok(self.company_info.clone())
    }

    fn query(&self, kind: TransactionKind, _window: &DateWindow) -> Result<Vec<Value>> {
        Ok(self.records(kind).to_vec())
    }

    fn profit_and_loss(&self, _window: &DateWindow) -> Result<Option<Value>> {
        Ok(self.profit_and_loss.clone())
    }
}

/// Reads `CompanyName` from a company-info payload, with or without its
/// `QueryResponse.CompanyInfo[0]` envelope.
pub fn company_name(info: &Value) -> Option<String> {
    let record = info
        .pointer("/QueryResponse/CompanyInfo/0")
        .or_else(|| info.get("CompanyInfo"))
        .unwrap_or(info);
    record
        .get("CompanyName")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

pub(crate) fn transport_error(source_name: &str, details: impl Into<String>) -> FinancialFlowError {
    FinancialFlowError::Transport {
        source_name: source_name.to_string(),
        details: details.into(),
    }
}
