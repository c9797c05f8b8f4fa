use crate::schema::ProjectCatalog;
use crate::utils::strip_parent_prefix;
use log::debug;
use regex::Regex;
use std::sync::LazyLock;

static DEPARTMENT_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}\s+[A-Z]").expect("hardcoded regex should be valid"));

static PROJECT_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"2-(?:24|25)-\d{4}\s+([A-Za-z][A-Za-z0-9&/ .-]*)")
        .expect("hardcoded regex should be valid")
});

static FLRA_TASK_ORDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bFLRA\b.*?\bTO\d+").expect("hardcoded regex should be valid")
});

static FLRA_PROJECT_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b2-\d{2}-\d{4}\s+FLRA\b").expect("hardcoded regex should be valid")
});

const FLRA_PROJECT: &str = "TWS FLRA";
const PROJECT_CODE_PREFIX: &str = "A6";

/// Resolves raw customer, class, entity and description strings onto the catalog's canonical
/// project names. Built once per request from the [`ProjectCatalog`].
#[derive(Debug, Clone)]
pub struct ProjectNormalizer {
    /// (lower-cased, canonical)
    canonical: Vec<(String, String)>,
    /// (lower-cased variant, canonical), longest variant first
    variants: Vec<(String, String)>,
    keywords: Vec<(String, String)>,
    code_names: Vec<(String, String)>,
    uppercase: Vec<(Regex, String)>,
    indicators: Vec<String>,
    blacklist: Vec<String>,
}

impl ProjectNormalizer {
    pub fn new(catalog: &ProjectCatalog) -> Self {
        let canonical: Vec<(String, String)> = catalog
            .canonical_projects
            .iter()
            .map(|name| (name.trim().to_lowercase(), name.trim().to_string()))
            .collect();

        // Canonical names double as variants of themselves so "A6 CIE Sustainment" resolves.
        let mut variants: Vec<(String, String)> = catalog
            .project_variants
            .iter()
            .map(|(variant, target)| (variant.trim().to_lowercase(), target.clone()))
            .chain(canonical.iter().cloned())
            .filter(|(variant, _)| !variant.is_empty())
            .collect();
        sort_longest_first(&mut variants);

        let mut keywords: Vec<(String, String)> = catalog
            .description_keywords
            .iter()
            .map(|(keyword, target)| (keyword.trim().to_lowercase(), target.clone()))
            .filter(|(keyword, _)| !keyword.is_empty())
            .collect();
        sort_longest_first(&mut keywords);

        let mut code_names: Vec<(String, String)> = catalog
            .project_code_names
            .iter()
            .map(|(name, suffix)| (name.trim().to_lowercase(), suffix.clone()))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        sort_longest_first(&mut code_names);

        let mut uppercase_sorted: Vec<(String, String)> = catalog
            .uppercase_patterns
            .iter()
            .map(|(pattern, target)| (pattern.trim().to_string(), target.clone()))
            .filter(|(pattern, _)| !pattern.is_empty())
            .collect();
        sort_longest_first(&mut uppercase_sorted);
        let uppercase = uppercase_sorted
            .into_iter()
            .filter_map(|(pattern, target)| {
                Regex::new(&format!(r"\b{}\b", regex::escape(&pattern)))
                    .ok()
                    .map(|re| (re, target))
            })
            .collect();

        Self {
            canonical,
            variants,
            keywords,
            code_names,
            uppercase,
            indicators: catalog
                .indicator_tokens
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            blacklist: catalog
                .section_blacklist
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Canonicalizes a raw `Project` or `Parent:Project` display string.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let name = strip_parent_prefix(raw);
        if name.is_empty() {
            return None;
        }

        if let Some(project) = self.match_registered(name) {
            return Some(project);
        }

        if DEPARTMENT_CODE.is_match(name) {
            debug!("'{}' is a department/class code, not a project", name);
            return None;
        }

        if self.has_indicator_token(name) && !self.is_blacklisted(name) {
            return Some(name.to_string());
        }

        None
    }

    /// Exact canonical match first, then the longest registered variant contained in `text`.
    pub fn match_registered(&self, text: &str) -> Option<String> {
        self.canonical_exact(text).or_else(|| {
            let lower = text.to_lowercase();
            self.variants
                .iter()
                .find(|(variant, _)| lower.contains(variant.as_str()))
                .map(|(_, canonical)| canonical.clone())
        })
    }

    pub fn canonical_exact(&self, text: &str) -> Option<String> {
        let lower = text.trim().to_lowercase();
        self.canonical
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, canonical)| canonical.clone())
    }

    /// Pulls a project out of a free-text line description or private note.
    ///
    /// Keyword table, then `2-24-NNNN Name` project codes, then FLRA patterns, then
    /// uppercase phrases; the first hit wins.
    pub fn extract_from_description(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        self.match_keyword(text)
            .or_else(|| self.match_project_code(text))
            .or_else(|| self.match_flra(text))
            .or_else(|| self.match_uppercase(text))
    }

    fn match_keyword(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .find(|(keyword, _)| lower.contains(keyword.as_str()))
            .map(|(_, canonical)| canonical.clone())
    }

    fn match_project_code(&self, text: &str) -> Option<String> {
        PROJECT_CODE.captures_iter(text).find_map(|captures| {
            let name = captures.get(1)?.as_str().trim().to_lowercase();
            let (_, suffix) = self
                .code_names
                .iter()
                .find(|(code_name, _)| name.starts_with(code_name.as_str()))?;
            self.canonical_exact(&format!("{} {}", PROJECT_CODE_PREFIX, suffix))
        })
    }

    fn match_flra(&self, text: &str) -> Option<String> {
        if FLRA_TASK_ORDER.is_match(text) || FLRA_PROJECT_CODE.is_match(text) {
            self.canonical_exact(FLRA_PROJECT)
        } else {
            None
        }
    }

    fn match_uppercase(&self, text: &str) -> Option<String> {
        self.uppercase
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
            .map(|(_, canonical)| canonical.clone())
    }

    fn has_indicator_token(&self, name: &str) -> bool {
        name.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .any(|word| {
                self.indicators
                    .iter()
                    .any(|token| word.starts_with(token.as_str()))
            })
    }

    fn is_blacklisted(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.blacklist
            .iter()
            .any(|word| lower.contains(word.as_str()))
    }
}

fn sort_longest_first(entries: &mut [(String, String)]) {
    entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
}
