use chrono::NaiveDate;
use financial_flow_builder::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn config() -> FlowConfig {
    FlowConfig::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
    )
}

fn data(name: &str, amount: &str) -> Value {
    json!({"ColData": [{"value": name}, {"value": amount}], "type": "Data"})
}

fn section(header: &str, group: Option<&str>, rows: Vec<Value>) -> Value {
    let mut value = json!({
        "Header": {"ColData": [{"value": header}, {"value": ""}]},
        "Rows": {"Row": rows},
        "Summary": {"ColData": [{"value": format!("Total {}", header)}, {"value": ""}]},
        "type": "Section"
    });
    if let Some(group) = group {
        value["group"] = json!(group);
    }
    value
}

fn standard_report() -> Value {
    json!({"QueryResponse": {"Report": {"Rows": {"Row": [
        section("Income", Some("Income"), vec![
            data("4000 Services Revenue", "20,000.00"),
            data("Total Income", "20,000.00"),
        ]),
        section("Cost of Goods Sold", Some("COGS"), vec![
            section("5000 Cost of Goods Sold", None, vec![
                data("5001 Salaries & wages", "5,000.00"),
                data("5011 Direct 1099 Labor", "1,000.00"),
            ]),
        ]),
        section("Expenses", Some("Expenses"), vec![
            section("6000 Fringe Benefits", None, vec![
                data("6010 Health Insurance", "4,000.00"),
                data("6110 Payroll Taxes", "500.00"),
            ]),
            section("8000 General & Administrative", None, vec![
                data("8005 Salaries and Wages", "3,000.00"),
                data("8010 Office Supplies", "250.00"),
            ]),
            data("6500 Rent", "12,000.00"),
        ]),
        section("Other Expenses", Some("OtherExpenses"), vec![
            data("9100 Unallowable Entertainment", "700.00"),
        ]),
    ]}}}})
}

fn invoice(id: &str, total: f64, customer: &str) -> Value {
    json!({
        "Id": id,
        "TxnDate": "2024-03-15",
        "TotalAmt": total,
        "CustomerRef": {"name": customer, "value": "1"},
        "TxnType": "Invoice",
        "DocNumber": format!("INV-{}", id)
    })
}

fn je_line(
    posting: &str,
    account: &str,
    amount: f64,
    entity: Option<&str>,
    class: Option<&str>,
    description: Option<&str>,
) -> Value {
    let mut detail = json!({
        "PostingType": posting,
        "AccountRef": {"name": account}
    });
    if let Some(class) = class {
        detail["ClassRef"] = json!({"name": class});
    }
    let mut line = json!({
        "Amount": amount,
        "DetailType": "JournalEntryLineDetail",
        "JournalEntryLineDetail": detail
    });
    if let Some(entity) = entity {
        line["Entity"] = json!({"EntityRef": {"name": entity}, "Type": "Customer"});
    }
    if let Some(description) = description {
        line["Description"] = json!(description);
    }
    line
}

fn journal_entry(id: &str, lines: Vec<Value>) -> Value {
    json!({
        "Id": id,
        "TxnDate": "2024-04-30",
        "DocNumber": format!("JE-{}", id),
        "Line": lines
    })
}

fn bill_line(account: &str, amount: f64, customer: Option<&str>, class: Option<&str>) -> Value {
    let mut detail = json!({"AccountRef": {"name": account}});
    if let Some(customer) = customer {
        detail["CustomerRef"] = json!({"name": customer});
    }
    if let Some(class) = class {
        detail["ClassRef"] = json!({"name": class});
    }
    json!({
        "Amount": amount,
        "DetailType": "AccountBasedExpenseLineDetail",
        "AccountBasedExpenseLineDetail": detail
    })
}

fn bill(id: &str, vendor: &str, lines: Vec<Value>) -> Value {
    json!({
        "Id": id,
        "TxnDate": "2024-05-10",
        "VendorRef": {"name": vendor},
        "Line": lines
    })
}

fn snapshot() -> LedgerSnapshot {
    LedgerSnapshot {
        company_info: Some(json!({"QueryResponse": {"CompanyInfo": [{"CompanyName": "Agile Six"}]}})),
        profit_and_loss: Some(standard_report()),
        ..Default::default()
    }
}

fn attached_projects(flow: &FinancialFlow, primary: &str, secondary: &str) -> BTreeMap<String, f64> {
    flow.expense_hierarchy.primaries[primary].secondaries[secondary]
        .projects
        .clone()
        .unwrap_or_default()
}

#[test]
fn test_single_invoice() {
    let mut ledger = snapshot();
    ledger.invoices = vec![invoice("1", 1500.0, "Parent:A6 CIE")];

    let flow = process_financial_flow(&config(), &ledger);
    assert_eq!(flow.income, BTreeMap::from([("A6 CIE".to_string(), 1500.0)]));
    assert_eq!(flow.total_revenue, 1500.0);
    assert_eq!(flow.income_source_type, IncomeSourceType::Projects);
    assert_eq!(flow.company_name.as_deref(), Some("Agile Six"));
}

#[test]
fn test_refund_invoice_is_dropped() {
    let mut ledger = snapshot();
    let mut refund = invoice("7", -200.0, "CDSP");
    refund["DocNumber"] = json!("INV-7");
    ledger.invoices = vec![refund, invoice("8", 900.0, "A6 VBMS")];

    let flow = process_financial_flow(&config(), &ledger);
    assert!(!flow.income.contains_key("CDSP"));
    assert_eq!(flow.total_revenue, 900.0);
}

#[test]
fn test_journal_typed_invoice_is_a_transfer() {
    let mut ledger = snapshot();
    let mut transfer = invoice("9", -500.0, "CDSP");
    transfer["TxnType"] = json!("JournalEntry");
    ledger.invoices = vec![transfer];

    let flow = process_financial_flow(&config(), &ledger);
    assert_eq!(flow.income["CDSP"], 500.0);
}

#[test]
fn test_cogs_project_split() {
    let mut ledger = snapshot();
    ledger.invoices = vec![invoice("1", 20000.0, "A6 CIE")];
    ledger.journal_entries = vec![journal_entry(
        "40",
        vec![
            je_line("Debit", "5001 Salaries & wages", 3000.0, Some("A6 CIE"), None, None),
            je_line("Debit", "5001 Salaries & wages", 2000.0, Some("CDSP"), None, None),
            je_line("Credit", "5001 Salaries & wages", 500.0, Some("A6 CIE"), None, None),
            je_line("Credit", "2100 Payroll Liabilities", 4500.0, None, None, None),
        ],
    )];

    let flow = process_financial_flow(&config(), &ledger);
    let projects = attached_projects(&flow, "5000 Cost of Goods Sold", "Billable Salaries and Wages");
    assert_eq!(
        projects,
        BTreeMap::from([("A6 CIE".to_string(), 3000.0), ("CDSP".to_string(), 2000.0)])
    );
    assert_eq!(
        flow.project_expenses["Billable Salaries and Wages"],
        projects
    );
    assert_eq!(flow.income.len(), 1);
}

#[test]
fn test_internal_allocation_exclusion() {
    let mut ledger = snapshot();
    ledger.journal_entries = vec![journal_entry(
        "41",
        vec![
            je_line(
                "Debit",
                "5001 Salaries & wages",
                700.0,
                Some("CDSP"),
                None,
                Some("Salary for 9-overhead"),
            ),
            je_line("Debit", "5001 Salaries & wages", 1000.0, Some("A6 CIE"), None, None),
        ],
    )];

    let flow = process_financial_flow(&config(), &ledger);
    let projects = attached_projects(&flow, "5000 Cost of Goods Sold", "Billable Salaries and Wages");
    assert_eq!(projects, BTreeMap::from([("A6 CIE".to_string(), 1000.0)]));
    for projects in flow.project_expenses.values() {
        assert!(!projects.contains_key("CDSP"));
        assert!(projects.values().all(|amount| *amount != 700.0));
    }
}

#[test]
fn test_ga_class_partition() {
    let mut ledger = snapshot();
    ledger.bills = vec![
        bill(
            "50",
            "Payroll Co",
            vec![bill_line(
                "5001 Salaries & wages",
                400.0,
                Some("CDSP"),
                Some("8005 Salaries and Wages (GA)"),
            )],
        ),
        bill(
            "51",
            "Payroll Co",
            vec![bill_line("5001 Salaries & wages", 600.0, Some("CDSP"), Some("03 Product"))],
        ),
    ];
    ledger.journal_entries = vec![journal_entry(
        "42",
        vec![
            je_line("Debit", "8005 Salaries and Wages", 800.0, Some("A6 CIE"), Some("G&A"), None),
            je_line("Debit", "8005 Salaries and Wages", 300.0, Some("CDSP"), Some("03 Product"), None),
        ],
    )];

    let flow = process_financial_flow(&config(), &ledger);
    let cogs = attached_projects(&flow, "5000 Cost of Goods Sold", "Billable Salaries and Wages");
    assert_eq!(cogs, BTreeMap::from([("CDSP".to_string(), 600.0)]));

    let ga = attached_projects(&flow, "8000 General & Administrative", "G&A Salaries and Wages");
    assert_eq!(ga, BTreeMap::from([("A6 CIE".to_string(), 800.0)]));
    assert_eq!(flow.project_expenses["8005 Salaries and Wages"], ga);
}

#[test]
fn test_vendor_veto_on_contractor_labor() {
    let mut ledger = snapshot();
    ledger.bills = vec![
        bill(
            "60",
            "Agile Six Enterprise Services LLC",
            vec![bill_line("5011 Direct 1099 Labor", 300.0, None, None)],
        ),
        bill(
            "61",
            "Caseflow Contractors Inc",
            vec![bill_line("5011 Direct 1099 Labor", 200.0, None, None)],
        ),
    ];

    let flow = process_financial_flow(&config(), &ledger);
    let projects = attached_projects(&flow, "5000 Cost of Goods Sold", "5011 Direct 1099 Labor");
    assert_eq!(projects[UNASSIGNED], 300.0);
    assert_eq!(projects["A6 Caseflow"], 200.0);
    assert!(!projects.contains_key("A6 Enterprise Services"));
}

#[test]
fn test_journal_income_collapses_within_entry() {
    let mut ledger = snapshot();
    ledger.journal_entries = vec![
        journal_entry(
            "70",
            vec![
                je_line("Credit", "4000 Services Revenue", 1000.0, Some("CDSP"), None, None),
                je_line("Debit", "4000 Services Revenue", 400.0, Some("CDSP"), None, None),
                je_line("Debit", "1200 Accounts Receivable", 600.0, None, None, None),
            ],
        ),
        journal_entry(
            "71",
            vec![je_line("Credit", "4005 Reimbursed Expenses", 250.0, Some("A6 CIE"), None, None)],
        ),
    ];

    let flow = process_financial_flow(&config(), &ledger);
    assert_eq!(flow.income["CDSP"], 600.0);
    assert_eq!(flow.income["A6 CIE"], 250.0);
    assert_eq!(flow.total_revenue, 850.0);
}

#[test]
fn test_other_expenses_never_appear() {
    let flow = process_financial_flow(&config(), &snapshot());
    assert!(!flow.expenses.contains_key("9100 Unallowable Entertainment"));
    assert!(!flow.expense_hierarchy.primaries.contains_key("Other Expenses"));
    for (_, _, secondary) in flow.expense_hierarchy.secondaries() {
        assert!(!secondary.tertiaries.contains_key("9100 Unallowable Entertainment"));
    }
    assert_eq!(flow.total_expenses, 6000.0 + 4500.0 + 3250.0 + 12000.0);
}

#[test]
fn test_report_income_fallback() {
    let flow = process_financial_flow(&config(), &snapshot());
    assert_eq!(flow.income_source_type, IncomeSourceType::Accounts);
    assert_eq!(flow.income["4000 Services Revenue"], 20000.0);
    assert_eq!(flow.total_revenue, 20000.0);
    assert_eq!(flow.net_income, 20000.0 - flow.total_expenses);
}

#[test]
fn test_no_report_no_income_is_zeroed() {
    let ledger = LedgerSnapshot::default();
    let flow = process_financial_flow(&config(), &ledger);
    assert!(flow.is_empty());
    assert_eq!(flow.income_source_type, IncomeSourceType::None);
    assert_eq!(flow.net_income, 0.0);
    assert!(flow.project_expenses.is_empty());
}

#[test]
fn test_small_expenses_bucketing() {
    let cfg = config();
    let flow = process_financial_flow(&cfg, &snapshot());
    let grouped = flow.grouped_expenses(&cfg);

    assert_eq!(grouped["6000-6300 Fringe & Benefits"], 4500.0);
    assert_eq!(grouped["8000-8499 GA Other"], 250.0);
    assert_eq!(grouped["G&A Salaries and Wages"], 3000.0);
    assert_eq!(grouped["6500 Rent"], 12000.0);
    assert!(!grouped.contains_key("6010 Health Insurance"));
    assert_eq!(grouped.values().sum::<f64>(), flow.total_expenses);
}

#[test]
fn test_malformed_and_out_of_window_records_skipped() {
    let mut ledger = snapshot();
    let mut last_year = invoice("2", 999.0, "CDSP");
    last_year["TxnDate"] = json!("2023-06-01");
    ledger.invoices = vec![
        invoice("1", 1500.0, "A6 CIE"),
        last_year,
        json!({"Id": "3", "TxnDate": "garbage", "TotalAmt": 10}),
        json!(["not", "an", "invoice"]),
    ];

    let flow = process_financial_flow(&config(), &ledger);
    assert_eq!(flow.income, BTreeMap::from([("A6 CIE".to_string(), 1500.0)]));
}

#[test]
fn test_unallocated_residual() {
    let mut cfg = config();
    cfg.attach_unallocated_residual = true;
    let mut ledger = snapshot();
    ledger.journal_entries = vec![journal_entry(
        "80",
        vec![je_line("Debit", "5001 Salaries & wages", 4000.0, Some("CDSP"), None, None)],
    )];

    let flow = process_financial_flow(&cfg, &ledger);
    let projects = attached_projects(&flow, "5000 Cost of Goods Sold", "Billable Salaries and Wages");
    assert_eq!(projects["CDSP"], 4000.0);
    assert_eq!(projects[UNALLOCATED], 1000.0);
}

#[test]
fn test_full_ledger_passes_verification() -> anyhow::Result<()> {
    let mut ledger = snapshot();
    ledger.invoices = vec![
        invoice("1", 12000.0, "Parent:A6 CIE"),
        invoice("2", 8000.0, "CDSP"),
    ];
    ledger.sales_receipts = vec![invoice("3", 500.0, "Perigean Data Pilot")];
    ledger.journal_entries = vec![journal_entry(
        "90",
        vec![
            je_line("Debit", "5001 Salaries & wages", 2500.0, Some("A6 CIE"), None, None),
            je_line("Debit", "5001 Salaries & wages", 2500.0, None, None, Some("CDSP sprint")),
            je_line("Debit", "8005 Salaries and Wages", 3000.0, None, Some("G&A"), None),
            je_line("Credit", "2100 Payroll Liabilities", 8000.0, None, None, None),
        ],
    )];
    ledger.bills = vec![bill(
        "91",
        "Jane Contractor LLC",
        vec![bill_line("5011 Direct 1099 Labor", 1000.0, Some("TWS FLRA"), None)],
    )];

    let cfg = config();
    let flow = process_with_verification(&cfg, &ledger, 0.01)?;

    assert_eq!(flow.total_revenue, 20500.0);
    assert_eq!(flow.income["Perigean Data Pilot"], 500.0);
    assert_eq!(flow.project_expenses["5011 Direct 1099 Labor"]["TWS FLRA"], 1000.0);
    assert_eq!(flow.project_expenses["8005 Salaries and Wages"][UNASSIGNED], 3000.0);

    let hierarchy_totals: f64 = flow
        .expense_hierarchy
        .primaries
        .values()
        .map(|p| p.total)
        .sum();
    assert_eq!(hierarchy_totals, flow.total_expenses);

    let result = FlowVerifier::new(0.01, cfg.attribution_tolerance).verify(&flow);
    assert!(result.is_valid());
    Ok(())
}

#[test]
fn test_snapshot_bundle_and_exports() -> anyhow::Result<()> {
    let mut ledger = snapshot();
    ledger.invoices = vec![invoice("1", 1500.0, "A6 CIE")];
    let bundle = serde_json::to_string(&ledger)?;

    let restored = LedgerSnapshot::from_json(&bundle)?;
    let flow = process_financial_flow(&config(), &restored);

    let json = flow.to_json()?;
    assert_eq!(FinancialFlow::from_json(&json)?, flow);

    let value: Value = serde_json::from_str(&json)?;
    assert_eq!(value["income_source_type"], "projects");
    assert_eq!(value["income"]["A6 CIE"], 1500.0);

    assert!(flow.to_markdown().contains("# Agile Six"));
    assert!(flow.to_csv().contains("Income,,,A6 CIE,1500.00"));
    Ok(())
}

#[test]
fn test_config_schema_and_json() -> anyhow::Result<()> {
    let schema = FlowConfig::schema_as_json()?;
    assert!(schema.contains("vendor_vetoes"));

    let cfg = FlowConfig::from_json(
        r#"{"start_date": "2024-01-01", "end_date": "2024-06-30", "small_amount_threshold": 5000}"#,
    )?;
    assert_eq!(cfg.small_amount_threshold, 5000.0);
    assert_eq!(cfg.window().end, NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());

    assert!(FlowConfig::from_json(r#"{"start_date": "2024-06-30", "end_date": "2024-01-01"}"#).is_err());
    Ok(())
}
