//! DOI and index id parsing

use regex_lite::Regex;
use std::fmt;
use std::sync::OnceLock;

fn doi_pattern() -> &'static Regex {
    static DOI: OnceLock<Regex> = OnceLock::new();
    DOI.get_or_init(|| {
        Regex::new(r#"(?i)\b(10\.\d{4,9}/[^\s"'<>]+)"#).expect("DOI pattern is valid")
    })
}

fn work_id_pattern() -> &'static Regex {
    static WORK_ID: OnceLock<Regex> = OnceLock::new();
    WORK_ID.get_or_init(|| {
        Regex::new(r"(?i)^(?:https?://(?:api\.)?openalex\.org/(?:works/)?)?(W\d+)/?$")
            .expect("work id pattern is valid")
    })
}

/// Identifier accepted by an exact index lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkIdentifier {
    Doi(String),
    IndexId(String),
}

impl WorkIdentifier {
    /// Classify a user or model supplied identifier. Links are accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(id) = normalize_work_id(raw) {
            return Some(WorkIdentifier::IndexId(id));
        }
        extract_doi(raw).map(WorkIdentifier::Doi)
    }

    pub fn as_str(&self) -> &str {
        match self {
            WorkIdentifier::Doi(doi) => doi,
            WorkIdentifier::IndexId(id) => id,
        }
    }
}

impl fmt::Display for WorkIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkIdentifier::Doi(doi) => write!(f, "doi:{}", doi),
            WorkIdentifier::IndexId(id) => write!(f, "{}", id),
        }
    }
}

/// Pull the first DOI out of free text or a link (`https://doi.org/...`)
pub fn extract_doi(text: &str) -> Option<String> {
    let found = doi_pattern().captures(text)?.get(1)?.as_str();
    let doi = found.trim_end_matches(['.', ',', ';', ')', ']']);
    Some(doi.to_lowercase())
}

/// Strip resolver prefixes and lowercase a DOI
pub fn normalize_doi(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    let stripped = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "http://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower);
    stripped.to_string()
}

/// Reduce an index id or URL to its short `W…` form
pub fn normalize_work_id(raw: &str) -> Option<String> {
    work_id_pattern()
        .captures(raw.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase())
}
