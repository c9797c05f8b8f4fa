use crate::hierarchy::ExpenseHierarchy;
use crate::project_expenses::ProjectExpenses;
use crate::schema::UNALLOCATED;
use crate::utils::sum_values;
use log::{debug, info, warn};
use std::collections::BTreeSet;

/// Outcome of attaching project maps onto the expense hierarchy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrationReport {
    /// Target accounts that were attached to at least one secondary.
    pub attached: BTreeSet<String>,
    /// Target accounts with project data but no matching secondary.
    pub unmatched: BTreeSet<String>,
    /// Secondaries whose attached projects exceed the tolerance, `(secondary, sum, total)`.
    pub over_attributed: Vec<(String, f64, f64)>,
    /// Later secondaries left bare because their account was already attached elsewhere.
    pub duplicates: Vec<String>,
}

pub struct HierarchyIntegrator<'a> {
    target_accounts: &'a BTreeSet<String>,
    tolerance: f64,
    attach_residual: bool,
}

impl<'a> HierarchyIntegrator<'a> {
    pub fn new(target_accounts: &'a BTreeSet<String>, tolerance: f64) -> Self {
        Self {
            target_accounts,
            tolerance,
            attach_residual: false,
        }
    }

    /// Also tops attached maps up with an `Unallocated` entry for the unexplained remainder.
    pub fn with_unallocated_residual(mut self, enabled: bool) -> Self {
        self.attach_residual = enabled;
        self
    }

    pub fn integrate(
        &self,
        hierarchy: &mut ExpenseHierarchy,
        project_expenses: &ProjectExpenses,
    ) -> IntegrationReport {
        let mut report = IntegrationReport::default();

        for (name, secondary) in hierarchy.secondaries_mut() {
            let Some(account) = secondary.account_number.clone() else {
                continue;
            };
            if !self.target_accounts.contains(&account) {
                continue;
            }
            if report.attached.contains(&account) {
                warn!(
                    "Account {} already attached; leaving '{}' without projects",
                    account, name
                );
                report.duplicates.push(name.to_string());
                continue;
            }
            let Some(projects) = project_expenses.for_account(&account) else {
                debug!("No project data for account {} ('{}')", account, name);
                continue;
            };

            let mut projects = projects.clone();
            let attributed = sum_values(&projects);
            let limit = secondary.total * (1.0 + self.tolerance);
            if attributed > limit {
                warn!(
                    "Projects on '{}' sum to {:.2}, above account total {:.2}",
                    name, attributed, secondary.total
                );
                report
                    .over_attributed
                    .push((name.to_string(), attributed, secondary.total));
            }

            if self.attach_residual {
                let residual = secondary.total - attributed;
                if residual > 0.0 {
                    *projects.entry(UNALLOCATED.to_string()).or_insert(0.0) += residual;
                }
            }

            info!(
                "Attached {} projects to '{}' (account {})",
                projects.len(),
                name,
                account
            );
            secondary.projects = Some(projects);
            report.attached.insert(account);
        }

        for account in project_expenses.accounts().keys() {
            if self.target_accounts.contains(account) && !report.attached.contains(account) {
                report.unmatched.insert(account.clone());
            }
        }

        if !report.unmatched.is_empty() {
            let available: Vec<String> = hierarchy
                .secondaries()
                .map(|(_, name, node)| {
                    format!("{} [{}]", name, node.account_number.as_deref().unwrap_or("-"))
                })
                .collect();
            warn!(
                "No secondary found for accounts {:?}; available: {}",
                report.unmatched,
                available.join(", ")
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ProjectSource;
    use crate::hierarchy::{PrimaryNode, SecondaryNode};
    use crate::project_expenses::ExpenseAttribution;
    use crate::records::TransactionKind;

    fn hierarchy() -> ExpenseHierarchy {
        let mut cogs = PrimaryNode::default();
        cogs.insert_secondary(
            "Billable Salaries and Wages".to_string(),
            SecondaryNode::from_row("5001 Salaries & wages", 5000.0),
        );
        cogs.insert_secondary(
            "5020 Materials".to_string(),
            SecondaryNode::from_row("5020 Materials", 100.0),
        );
        let mut hierarchy = ExpenseHierarchy::new();
        hierarchy.insert_primary("5000 Cost of Goods Sold".to_string(), cogs);
        hierarchy
    }

    fn expenses(entries: &[(&str, &str, f64)]) -> ProjectExpenses {
        entries
            .iter()
            .map(|(account, project, amount)| ExpenseAttribution {
                account_number: account.to_string(),
                project: project.to_string(),
                amount: *amount,
                source: ProjectSource::LineEntity,
                kind: TransactionKind::JournalEntry,
            })
            .collect()
    }

    fn targets() -> BTreeSet<String> {
        ["5001", "5011", "8005"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_attaches_by_account_number() {
        let mut h = hierarchy();
        let targets = targets();
        let report = HierarchyIntegrator::new(&targets, 0.01).integrate(
            &mut h,
            &expenses(&[("5001", "A6 CIE", 3000.0), ("5001", "CDSP", 2000.0)]),
        );

        let node = &h.primaries["5000 Cost of Goods Sold"].secondaries["Billable Salaries and Wages"];
        let projects = node.projects.as_ref().unwrap();
        assert_eq!(projects["A6 CIE"], 3000.0);
        assert_eq!(projects["CDSP"], 2000.0);
        assert!(report.attached.contains("5001"));
        assert!(report.over_attributed.is_empty());
        assert!(h.primaries["5000 Cost of Goods Sold"].secondaries["5020 Materials"]
            .projects
            .is_none());
    }

    #[test]
    fn test_over_attribution_is_reported_not_fatal() {
        let mut h = hierarchy();
        let targets = targets();
        let report = HierarchyIntegrator::new(&targets, 0.01)
            .integrate(&mut h, &expenses(&[("5001", "A6 CIE", 5100.0)]));
        assert_eq!(report.over_attributed.len(), 1);
        assert!(h.primaries["5000 Cost of Goods Sold"].secondaries["Billable Salaries and Wages"]
            .projects
            .is_some());

        let mut h = hierarchy();
        let report = HierarchyIntegrator::new(&targets, 0.01)
            .integrate(&mut h, &expenses(&[("5001", "A6 CIE", 5040.0)]));
        assert!(report.over_attributed.is_empty());
    }

    #[test]
    fn test_unmatched_accounts() {
        let mut h = hierarchy();
        let targets = targets();
        let report = HierarchyIntegrator::new(&targets, 0.01)
            .integrate(&mut h, &expenses(&[("8005", "CDSP", 10.0)]));
        assert!(report.attached.is_empty());
        assert!(report.unmatched.contains("8005"));
    }

    #[test]
    fn test_account_attached_to_first_secondary_only() {
        let mut h = hierarchy();
        let mut other = PrimaryNode::default();
        other.insert_secondary(
            "5001 Salaries & wages (Overhead)".to_string(),
            SecondaryNode::from_row("5001 Salaries & wages (Overhead)", 800.0),
        );
        h.insert_primary("6000 Operating Expenses".to_string(), other);

        let targets = targets();
        let report = HierarchyIntegrator::new(&targets, 0.01)
            .integrate(&mut h, &expenses(&[("5001", "A6 CIE", 3000.0)]));

        assert!(h.primaries["5000 Cost of Goods Sold"].secondaries["Billable Salaries and Wages"]
            .projects
            .is_some());
        assert!(h.primaries["6000 Operating Expenses"].secondaries
            ["5001 Salaries & wages (Overhead)"]
            .projects
            .is_none());
        assert_eq!(report.duplicates, vec!["5001 Salaries & wages (Overhead)".to_string()]);
        assert!(report.over_attributed.is_empty());
    }

    #[test]
    fn test_unallocated_residual() {
        let mut h = hierarchy();
        let targets = targets();
        HierarchyIntegrator::new(&targets, 0.01)
            .with_unallocated_residual(true)
            .integrate(&mut h, &expenses(&[("5001", "CDSP", 4000.0)]));
        let projects = h.primaries["5000 Cost of Goods Sold"].secondaries
            ["Billable Salaries and Wages"]
            .projects
            .clone()
            .unwrap();
        assert_eq!(projects[UNALLOCATED], 1000.0);
        assert_eq!(sum_values(&projects), 5000.0);
    }
}
