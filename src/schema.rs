use crate::error::{FinancialFlowError, Result};
use crate::utils::{default_window, parse_iso_date};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const UNASSIGNED: &str = "Unassigned";
pub const UNALLOCATED: &str = "Unallocated";

/// Inclusive `[start, end]` date range a request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(FinancialFlowError::InvalidDateWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct GroupRange {
    #[schemars(description = "Display label of the bucket, e.g. 'Fringe & Benefits'")]
    pub label: String,

    #[schemars(description = "First account number (inclusive) covered by the bucket")]
    pub start: u32,

    #[schemars(description = "Last account number (inclusive) covered by the bucket")]
    pub end: u32,
}

impl GroupRange {
    pub fn new(label: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            label: label.into(),
            start,
            end,
        }
    }

    pub fn contains(&self, account_number: u32) -> bool {
        (self.start..=self.end).contains(&account_number)
    }

    /// Key the bucket is emitted under, e.g. `6000-6300 Fringe & Benefits`.
    pub fn bucket_name(&self) -> String {
        format!("{}-{} {}", self.start, self.end, self.label)
    }
}

/// The persistent normalization configuration: the closed set of canonical project names and
/// every table used to map raw names and descriptions onto them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ProjectCatalog {
    #[schemars(description = "The closed set of canonical project names")]
    pub canonical_projects: Vec<String>,

    #[serde(default)]
    #[schemars(
        description = "Name variant -> canonical project. A raw name containing the variant (case-insensitive) resolves to the canonical project."
    )]
    pub project_variants: BTreeMap<String, String>,

    #[serde(default)]
    #[schemars(
        description = "Free-text description keyword -> canonical project (case-insensitive substring match)"
    )]
    pub description_keywords: BTreeMap<String, String>,

    #[serde(default)]
    #[schemars(
        description = "Project name following a '2-24-NNNN' / '2-25-NNNN' code -> suffix used to build 'A6 <suffix>'"
    )]
    pub project_code_names: BTreeMap<String, String>,

    #[serde(default)]
    #[schemars(
        description = "Case-sensitive uppercase phrase (e.g. 'VA CIE') -> canonical project"
    )]
    pub uppercase_patterns: BTreeMap<String, String>,

    #[serde(default = "default_indicator_tokens")]
    #[schemars(
        description = "Words starting with one of these prefixes mark a raw name as a project"
    )]
    pub indicator_tokens: Vec<String>,

    #[serde(default = "default_section_blacklist")]
    #[schemars(description = "Report-section words that are never project names")]
    pub section_blacklist: Vec<String>,
}

impl Default for ProjectCatalog {
    fn default() -> Self {
        let canonical_projects = [
            "A6 CIE",
            "A6 Enterprise Services",
            "A6 VA Form Engine",
            "A6 VBMS",
            "A6 Lighthouse API",
            "A6 Caseflow",
            "A6 VEText",
            "CDSP",
            "TWS FLRA",
            "TWS DOL OWCP",
            "Perigean OMB",
            "Perigean Treasury",
            "DMVA Modernization",
            "DMVA Benefits Portal",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            canonical_projects,
            project_variants: string_map(&[
                ("agile six enterprise services", "A6 Enterprise Services"),
                ("agile six cie", "A6 CIE"),
                ("agile six form engine", "A6 VA Form Engine"),
                ("form engine", "A6 VA Form Engine"),
                ("caseflow", "A6 Caseflow"),
                ("vetext", "A6 VEText"),
                ("lighthouse", "A6 Lighthouse API"),
                ("vbms", "A6 VBMS"),
                ("federal labor relations authority", "TWS FLRA"),
                ("owcp", "TWS DOL OWCP"),
                ("office of management and budget", "Perigean OMB"),
                ("department of the treasury", "Perigean Treasury"),
                ("benefits portal", "DMVA Benefits Portal"),
            ]),
            description_keywords: string_map(&[
                ("cie sustainment", "A6 CIE"),
                ("enterprise services", "A6 Enterprise Services"),
                ("caseflow", "A6 Caseflow"),
                ("lighthouse", "A6 Lighthouse API"),
                ("vbms", "A6 VBMS"),
                ("vetext", "A6 VEText"),
                ("cdsp", "CDSP"),
                ("owcp", "TWS DOL OWCP"),
                ("perigean omb", "Perigean OMB"),
                ("treasury", "Perigean Treasury"),
                ("dmva modernization", "DMVA Modernization"),
                ("benefits portal", "DMVA Benefits Portal"),
            ]),
            project_code_names: string_map(&[
                ("cie", "CIE"),
                ("enterprise services", "Enterprise Services"),
                ("form engine", "VA Form Engine"),
                ("vbms", "VBMS"),
                ("lighthouse", "Lighthouse API"),
                ("caseflow", "Caseflow"),
                ("vetext", "VEText"),
            ]),
            uppercase_patterns: string_map(&[
                ("VA CIE", "A6 CIE"),
                ("VA FORM ENGINE", "A6 VA Form Engine"),
                ("VA VBMS", "A6 VBMS"),
                ("DOL OWCP", "TWS DOL OWCP"),
            ]),
            indicator_tokens: default_indicator_tokens(),
            section_blacklist: default_section_blacklist(),
        }
    }
}

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_indicator_tokens() -> Vec<String> {
    ["a6", "tws", "cdsp", "perigean", "dmva"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_section_blacklist() -> Vec<String> {
    [
        "cost of goods sold",
        "income",
        "revenue",
        "gross profit",
        "net income",
        "expenses",
        "total",
        "salaries",
        "wages",
        "overhead",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_target_cogs_accounts() -> BTreeSet<String> {
    ["5001", "5011"].iter().map(|s| s.to_string()).collect()
}

fn default_target_ga_accounts() -> BTreeSet<String> {
    ["8005"].iter().map(|s| s.to_string()).collect()
}

fn default_group_ranges() -> Vec<GroupRange> {
    vec![
        GroupRange::new("Fringe & Benefits", 6000, 6300),
        GroupRange::new("Facility", 6500, 6999),
        GroupRange::new("OH Other", 7000, 7500),
        GroupRange::new("GA Other", 8000, 8499),
    ]
}

fn default_small_amount_threshold() -> f64 {
    10_000.0
}

fn default_attribution_tolerance() -> f64 {
    0.01
}

fn default_vendor_vetoes() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([(
        "5011".to_string(),
        vec!["A6 Enterprise Services".to_string()],
    )])
}

fn default_target_display_names() -> BTreeMap<String, String> {
    string_map(&[
        ("5001", "Billable Salaries and Wages"),
        ("5011", "5011 Direct 1099 Labor"),
        ("8005", "8005 Salaries and Wages"),
    ])
}

fn default_report_name_rewrites() -> BTreeMap<String, String> {
    string_map(&[
        ("5001 Salaries & wages", "Billable Salaries and Wages"),
        ("8005 Salaries and Wages", "G&A Salaries and Wages"),
    ])
}

/// Pre-resolved configuration for one aggregation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct FlowConfig {
    #[schemars(description = "First day of the request window (YYYY-MM-DD, inclusive)")]
    pub start_date: NaiveDate,

    #[schemars(description = "Last day of the request window (YYYY-MM-DD, inclusive)")]
    pub end_date: NaiveDate,

    #[serde(default = "default_target_cogs_accounts")]
    #[schemars(description = "COGS leaf account numbers that receive project attribution")]
    pub target_cogs_accounts: BTreeSet<String>,

    #[serde(default = "default_target_ga_accounts")]
    #[schemars(description = "G&A leaf account numbers that receive project attribution")]
    pub target_ga_accounts: BTreeSet<String>,

    #[serde(default)]
    #[schemars(description = "Canonical project names and the tables mapping raw names onto them")]
    pub projects: ProjectCatalog,

    #[serde(default = "default_group_ranges")]
    #[schemars(description = "Account-number ranges small flat expenses are bucketed into")]
    pub group_ranges: Vec<GroupRange>,

    #[serde(default = "default_small_amount_threshold")]
    #[schemars(description = "Flat expenses below this amount are bucketed by range")]
    pub small_amount_threshold: f64,

    #[serde(default = "default_attribution_tolerance")]
    #[schemars(
        description = "Relative tolerance by which attached project amounts may exceed their account total (0.01 = 1%)"
    )]
    pub attribution_tolerance: f64,

    #[serde(default = "default_vendor_vetoes")]
    #[schemars(
        description = "Account number -> canonical projects a vendor name may never resolve to on that account"
    )]
    pub vendor_vetoes: BTreeMap<String, Vec<String>>,

    #[serde(default = "default_target_display_names")]
    #[schemars(description = "Account number -> display name used when emitting project breakdowns")]
    pub target_display_names: BTreeMap<String, String>,

    #[serde(default = "default_report_name_rewrites")]
    #[schemars(description = "Report account name -> display name used in the expense hierarchy")]
    pub report_name_rewrites: BTreeMap<String, String>,

    #[serde(default)]
    #[schemars(
        description = "If true, attached project maps receive an 'Unallocated' entry for the part of the account total no transaction explains"
    )]
    pub attach_unallocated_residual: bool,
}

impl FlowConfig {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            target_cogs_accounts: default_target_cogs_accounts(),
            target_ga_accounts: default_target_ga_accounts(),
            projects: ProjectCatalog::default(),
            group_ranges: default_group_ranges(),
            small_amount_threshold: default_small_amount_threshold(),
            attribution_tolerance: default_attribution_tolerance(),
            vendor_vetoes: default_vendor_vetoes(),
            target_display_names: default_target_display_names(),
            report_name_rewrites: default_report_name_rewrites(),
            attach_unallocated_residual: false,
        }
    }

    /// Builds the configuration for a dashboard request. Missing dates default to the window
    /// ending `today` and starting a year earlier.
    pub fn for_request(
        start_date: Option<&str>,
        end_date: Option<&str>,
        today: NaiveDate,
    ) -> Result<Self> {
        let (default_start, default_end) = default_window(today);
        let start = match start_date {
            Some(s) if !s.trim().is_empty() => parse_iso_date(s)?,
            _ => default_start,
        };
        let end = match end_date {
            Some(s) if !s.trim().is_empty() => parse_iso_date(s)?,
            _ => default_end,
        };
        DateWindow::new(start, end)?;
        Ok(Self::new(start, end))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: FlowConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn window(&self) -> DateWindow {
        DateWindow {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// Every account number that receives project attribution, COGS and G&A.
    pub fn target_accounts(&self) -> BTreeSet<String> {
        self.target_cogs_accounts
            .union(&self.target_ga_accounts)
            .cloned()
            .collect()
    }

    pub fn display_name_for(&self, account_number: &str) -> String {
        self.target_display_names
            .get(account_number)
            .cloned()
            .unwrap_or_else(|| account_number.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        DateWindow::new(self.start_date, self.end_date)?;

        if self.projects.canonical_projects.is_empty() {
            return Err(FinancialFlowError::InvalidConfig(
                "No canonical projects configured".to_string(),
            ));
        }

        if self.target_cogs_accounts.is_empty() && self.target_ga_accounts.is_empty() {
            return Err(FinancialFlowError::InvalidConfig(
                "No target accounts configured for project attribution".to_string(),
            ));
        }

        if let Some(shared) = self
            .target_cogs_accounts
            .intersection(&self.target_ga_accounts)
            .next()
        {
            return Err(FinancialFlowError::InvalidConfig(format!(
                "Account {} is configured as both a COGS and a G&A target",
                shared
            )));
        }

        for (variant, canonical) in self
            .projects
            .project_variants
            .iter()
            .chain(self.projects.description_keywords.iter())
            .chain(self.projects.uppercase_patterns.iter())
        {
            if !self.projects.canonical_projects.contains(canonical) {
                return Err(FinancialFlowError::InvalidConfig(format!(
                    "'{}' maps to '{}', which is not a canonical project",
                    variant, canonical
                )));
            }
        }

        if self.small_amount_threshold < 0.0 {
            return Err(FinancialFlowError::InvalidConfig(format!(
                "small_amount_threshold must be non-negative, got {}",
                self.small_amount_threshold
            )));
        }

        if self.attribution_tolerance < 0.0 {
            return Err(FinancialFlowError::InvalidConfig(format!(
                "attribution_tolerance must be non-negative, got {}",
                self.attribution_tolerance
            )));
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FlowConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        let (start, end) = default_window(chrono::Local::now().date_naive());
        Self::new(start, end)
    }
}
