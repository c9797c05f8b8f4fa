use crate::flow::FinancialFlow;
use crate::income::IncomeSourceType;

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl FinancialFlow {
    /// One row per amount: `Section,Primary,Secondary,Item,Amount`.
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("Section,Primary,Secondary,Item,Amount\n");

        for (name, amount) in &self.income {
            output.push_str(&format!("Income,,,{},{:.2}\n", csv_field(name), amount));
        }

        for (primary_name, primary) in &self.expense_hierarchy.primaries {
            let primary_field = csv_field(primary_name);
            for (secondary_name, secondary) in &primary.secondaries {
                let secondary_field = csv_field(secondary_name);
                output.push_str(&format!(
                    "Expense,{},{},,{:.2}\n",
                    primary_field, secondary_field, secondary.total
                ));

                for (tertiary, amount) in &secondary.tertiaries {
                    output.push_str(&format!(
                        "Expense,{},{},{},{:.2}\n",
                        primary_field,
                        secondary_field,
                        csv_field(tertiary),
                        amount
                    ));
                }

                if let Some(projects) = &secondary.projects {
                    for (project, amount) in projects {
                        output.push_str(&format!(
                            "Project,{},{},{},{:.2}\n",
                            primary_field,
                            secondary_field,
                            csv_field(project),
                            amount
                        ));
                    }
                }
            }
        }

        output.push_str(&format!("Total,,,Revenue,{:.2}\n", self.total_revenue));
        output.push_str(&format!("Total,,,Expenses,{:.2}\n", self.total_expenses));
        output.push_str(&format!("Total,,,Net Income,{:.2}\n", self.net_income));

        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        let title = self.company_name.as_deref().unwrap_or("Financial Flow");
        output.push_str(&format!("# {}\n\n", title));
        output.push_str(&format!(
            "**Period:** {} to {}\n\n",
            self.start_date, self.end_date
        ));

        output.push_str("| | Amount |\n|---|---:|\n");
        output.push_str(&format!("| Revenue | {:.2} |\n", self.total_revenue));
        output.push_str(&format!("| Expenses | {:.2} |\n", self.total_expenses));
        output.push_str(&format!("| **Net Income** | **{:.2}** |\n\n", self.net_income));

        let income_heading = match self.income_source_type {
            IncomeSourceType::Projects => "Income by Project",
            IncomeSourceType::Accounts => "Income by Account",
            IncomeSourceType::None => "Income",
        };
        output.push_str(&format!("## {}\n\n", income_heading));
        if self.income.is_empty() {
            output.push_str("_No income for this period._\n");
        }
        for (name, amount) in &self.income {
            output.push_str(&format!("- {}: {:.2}\n", name, amount));
        }
        output.push('\n');

        output.push_str("## Expenses\n\n");
        for (primary_name, primary) in &self.expense_hierarchy.primaries {
            output.push_str(&format!("### {} ({:.2})\n\n", primary_name, primary.total));
            for (secondary_name, secondary) in &primary.secondaries {
                output.push_str(&format!("- {}: {:.2}\n", secondary_name, secondary.total));
                for (tertiary, amount) in &secondary.tertiaries {
                    output.push_str(&format!("  - {}: {:.2}\n", tertiary, amount));
                }
                if let Some(projects) = &secondary.projects {
                    for (project, amount) in projects {
                        output.push_str(&format!("  - _{}_: {:.2}\n", project, amount));
                    }
                }
            }
            output.push('\n');
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{ExpenseHierarchy, PrimaryNode, SecondaryNode};
    use crate::schema::DateWindow;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn flow() -> FinancialFlow {
        let mut primary = PrimaryNode::default();
        let mut salaries = SecondaryNode::from_row("5001 Salaries & wages", 5000.0);
        salaries.projects = Some(BTreeMap::from([("A6 CIE".to_string(), 3000.0)]));
        primary.insert_secondary("Billable Salaries and Wages".to_string(), salaries);
        primary.insert_secondary(
            "6000 Fringe, Benefits".to_string(),
            SecondaryNode::from_section(
                "6000 Fringe, Benefits",
                BTreeMap::from([("6110 FICA".to_string(), 250.0)]),
            ),
        );
        let mut hierarchy = ExpenseHierarchy::new();
        hierarchy.insert_primary("Costs".to_string(), primary);

        FinancialFlow::assemble(
            DateWindow::new(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            )
            .unwrap(),
            Some("Agile Six".to_string()),
            BTreeMap::from([("A6 CIE".to_string(), 9000.0)]),
            IncomeSourceType::Projects,
            hierarchy,
            BTreeMap::new(),
        )
    }

    #[test]
    fn test_flow_to_markdown() {
        let markdown = flow().to_markdown();
        assert!(markdown.contains("# Agile Six"));
        assert!(markdown.contains("**Period:** 2024-01-01 to 2024-12-31"));
        assert!(markdown.contains("## Income by Project"));
        assert!(markdown.contains("- A6 CIE: 9000.00"));
        assert!(markdown.contains("  - _A6 CIE_: 3000.00"));
        assert!(markdown.contains("**3750.00**"));
    }

    #[test]
    fn test_flow_to_csv() {
        let csv = flow().to_csv();
        assert!(csv.starts_with("Section,Primary,Secondary,Item,Amount\n"));
        assert!(csv.contains("Income,,,A6 CIE,9000.00"));
        assert!(csv.contains("Project,Costs,Billable Salaries and Wages,A6 CIE,3000.00"));
        assert!(csv.contains("Expense,Costs,\"6000 Fringe, Benefits\",6110 FICA,250.00"));
        assert!(csv.contains("Total,,,Net Income,3750.00"));
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
