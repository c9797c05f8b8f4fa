use crate::error::{FinancialFlowError, Result};
use crate::flow::FinancialFlow;
use crate::utils::{approx_eq, sum_values};
use log::warn;

/// Absolute tolerance for floating-point identities.
pub const DEFAULT_ROUNDING_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationResult {
    pub violations: Vec<String>,
    /// Allowed but noteworthy conditions, e.g. negative project income.
    pub warnings: Vec<String>,
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct FlowVerifier {
    rounding_tolerance: f64,
    attribution_tolerance: f64,
}

impl Default for FlowVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_ROUNDING_TOLERANCE, 0.01)
    }
}

impl FlowVerifier {
    pub fn new(rounding_tolerance: f64, attribution_tolerance: f64) -> Self {
        Self {
            rounding_tolerance,
            attribution_tolerance,
        }
    }

    pub fn verify(&self, flow: &FinancialFlow) -> VerificationResult {
        let mut result = VerificationResult::default();
        let tol = self.rounding_tolerance;

        let income_sum = sum_values(&flow.income);
        if !approx_eq(income_sum, flow.total_revenue, tol) {
            result.violations.push(format!(
                "Income sums to {:.2} but total_revenue is {:.2}",
                income_sum, flow.total_revenue
            ));
        }

        let hierarchy_sum = flow.expense_hierarchy.total();
        if !approx_eq(hierarchy_sum, flow.total_expenses, tol) {
            result.violations.push(format!(
                "Expense hierarchy sums to {:.2} but total_expenses is {:.2}",
                hierarchy_sum, flow.total_expenses
            ));
        }

        let flat_sum = sum_values(&flow.expenses);
        if !approx_eq(flat_sum, flow.total_expenses, tol) {
            result.violations.push(format!(
                "Flat expenses sum to {:.2} but total_expenses is {:.2}",
                flat_sum, flow.total_expenses
            ));
        }

        let expected_net = flow.total_revenue - flow.total_expenses;
        if !approx_eq(expected_net, flow.net_income, tol) {
            result.violations.push(format!(
                "net_income is {:.2}, expected {:.2}",
                flow.net_income, expected_net
            ));
        }

        for (name, primary) in &flow.expense_hierarchy.primaries {
            let secondaries: f64 = primary.secondaries.values().map(|s| s.total).sum();
            if !approx_eq(primary.total, secondaries, tol) {
                result.violations.push(format!(
                    "Primary '{}' total {:.2} differs from its secondaries {:.2}",
                    name, primary.total, secondaries
                ));
            }
            if primary.total < 0.0 {
                result
                    .violations
                    .push(format!("Primary '{}' has negative total {:.2}", name, primary.total));
            }
        }

        for (primary, name, secondary) in flow.expense_hierarchy.secondaries() {
            if secondary.total < 0.0 {
                result.violations.push(format!(
                    "Secondary '{}' under '{}' has negative total {:.2}",
                    name, primary, secondary.total
                ));
            }

            if secondary.is_section() {
                let tertiaries = sum_values(&secondary.tertiaries);
                if !approx_eq(secondary.total, tertiaries, tol) {
                    result.violations.push(format!(
                        "Secondary '{}' total {:.2} differs from its tertiaries {:.2}",
                        name, secondary.total, tertiaries
                    ));
                }
            }

            if secondary.projects.is_some() {
                let attributed = secondary.projects_total();
                if attributed > secondary.total * (1.0 + self.attribution_tolerance) + tol {
                    result.violations.push(format!(
                        "Projects on '{}' sum to {:.2}, above total {:.2}",
                        name, attributed, secondary.total
                    ));
                }
            }
        }

        for (name, amount) in &flow.expenses {
            if *amount < 0.0 {
                result
                    .violations
                    .push(format!("Expense '{}' is negative ({:.2})", name, amount));
            }
        }

        for (project, amount) in &flow.income {
            if *amount < 0.0 {
                result.warnings.push(format!(
                    "Income for '{}' is negative ({:.2}) after journal offsets",
                    project, amount
                ));
            }
        }

        for warning in &result.warnings {
            warn!("{}", warning);
        }

        result
    }

    /// Like [`FlowVerifier::verify`], failing on the first violation.
    pub fn verify_strict(&self, flow: &FinancialFlow) -> Result<()> {
        let result = self.verify(flow);
        match result.violations.into_iter().next() {
            Some(violation) => Err(FinancialFlowError::InvariantViolation(violation)),
            None => Ok(()),
        }
    }
}

pub fn verify_flow(flow: &FinancialFlow, tolerance: f64) -> Result<()> {
    FlowVerifier::new(tolerance, 0.01).verify_strict(flow)
}
