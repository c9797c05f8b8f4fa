use crate::error::Result;
use crate::grouping::group_small_expenses;
use crate::hierarchy::ExpenseHierarchy;
use crate::income::IncomeSourceType;
use crate::schema::{DateWindow, FlowConfig};
use crate::utils::sum_values;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The normalized financial-flow model handed to the visualization layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialFlow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    #[schemars(description = "Project (or report income row) -> amount")]
    pub income: BTreeMap<String, f64>,

    #[schemars(description = "Leaf expense account -> amount")]
    pub expenses: BTreeMap<String, f64>,

    #[schemars(description = "Primary -> secondary -> tertiary expense tree")]
    pub expense_hierarchy: ExpenseHierarchy,

    pub total_revenue: f64,
    pub total_expenses: f64,
    pub net_income: f64,

    #[schemars(with = "String")]
    pub income_source_type: IncomeSourceType,

    #[serde(default)]
    #[schemars(description = "Attributed account display name -> project -> amount")]
    pub project_expenses: BTreeMap<String, BTreeMap<String, f64>>,
}

impl FinancialFlow {
    /// The zeroed result returned when nothing can be produced for the window.
    pub fn empty(window: DateWindow) -> Self {
        Self {
            company_name: None,
            start_date: window.start,
            end_date: window.end,
            income: BTreeMap::new(),
            expenses: BTreeMap::new(),
            expense_hierarchy: ExpenseHierarchy::default(),
            total_revenue: 0.0,
            total_expenses: 0.0,
            net_income: 0.0,
            income_source_type: IncomeSourceType::None,
            project_expenses: BTreeMap::new(),
        }
    }

    /// Computes the totals from the income map and the hierarchy.
    pub fn assemble(
        window: DateWindow,
        company_name: Option<String>,
        income: BTreeMap<String, f64>,
        income_source_type: IncomeSourceType,
        expense_hierarchy: ExpenseHierarchy,
        project_expenses: BTreeMap<String, BTreeMap<String, f64>>,
    ) -> Self {
        let total_revenue = sum_values(&income);
        let total_expenses = expense_hierarchy.total();
        let income_source_type = if income.is_empty() {
            IncomeSourceType::None
        } else {
            income_source_type
        };

        Self {
            company_name,
            start_date: window.start,
            end_date: window.end,
            expenses: expense_hierarchy.flat_expenses(),
            income,
            expense_hierarchy,
            total_revenue,
            total_expenses,
            net_income: total_revenue - total_expenses,
            income_source_type,
            project_expenses,
        }
    }

    pub fn window(&self) -> DateWindow {
        DateWindow {
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.income.is_empty() && self.expense_hierarchy.is_empty()
    }

    /// The flat expenses with small accounts folded into the configured range buckets.
    pub fn grouped_expenses(&self, config: &FlowConfig) -> BTreeMap<String, f64> {
        group_small_expenses(
            &self.expenses,
            &config.group_ranges,
            config.small_amount_threshold,
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
