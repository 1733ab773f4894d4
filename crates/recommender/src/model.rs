//! Domain types for the recommendation pipeline

use chrono::{DateTime, Utc};
use litgraph_common::bibliography::WorkRecord;
use litgraph_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Relationship kinds
// ============================================================================

/// Semantic link between a node and a literature item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Similar,
    BuildsOn,
    Prior,
    Contrast,
}

/// Accepted spellings, matched after normalization (lowercase, `-`/space -> `_`)
const RELATIONSHIP_TABLE: &[(&str, Relationship)] = &[
    ("similar", Relationship::Similar),
    ("similar_to", Relationship::Similar),
    ("related", Relationship::Similar),
    ("related_to", Relationship::Similar),
    ("relevant", Relationship::Similar),
    ("builds_on", Relationship::BuildsOn),
    ("build_on", Relationship::BuildsOn),
    ("extends", Relationship::BuildsOn),
    ("extension", Relationship::BuildsOn),
    ("follow_up", Relationship::BuildsOn),
    ("followup", Relationship::BuildsOn),
    ("leads_to", Relationship::BuildsOn),
    ("prior", Relationship::Prior),
    ("prior_work", Relationship::Prior),
    ("background", Relationship::Prior),
    ("foundational", Relationship::Prior),
    ("foundation", Relationship::Prior),
    ("predecessor", Relationship::Prior),
    ("contrast", Relationship::Contrast),
    ("contrasts", Relationship::Contrast),
    ("contrasting", Relationship::Contrast),
    ("contradicts", Relationship::Contrast),
    ("refutes", Relationship::Contrast),
    ("alternative", Relationship::Contrast),
    ("opposing", Relationship::Contrast),
];

fn normalize_spelling(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

impl Relationship {
    pub const ALL: [Relationship; 4] = [
        Relationship::Similar,
        Relationship::BuildsOn,
        Relationship::Prior,
        Relationship::Contrast,
    ];

    /// Table lookup over known spellings
    pub fn lookup(raw: &str) -> Option<Self> {
        let key = normalize_spelling(raw);
        RELATIONSHIP_TABLE
            .iter()
            .find(|(spelling, _)| *spelling == key)
            .map(|(_, rel)| *rel)
    }

    /// Table lookup, `default` on a miss
    pub fn normalize(raw: &str, default: Relationship) -> Self {
        Self::lookup(raw).unwrap_or(default)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Similar => "similar",
            Relationship::BuildsOn => "builds_on",
            Relationship::Prior => "prior",
            Relationship::Contrast => "contrast",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RelationshipFilter {
    #[default]
    Auto,
    Only(Relationship),
}

impl RelationshipFilter {
    /// Parse `auto` (or nothing) or any known relationship spelling
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(RelationshipFilter::Auto);
        };
        if raw.eq_ignore_ascii_case("auto") {
            return Ok(RelationshipFilter::Auto);
        }
        Relationship::lookup(raw)
            .map(RelationshipFilter::Only)
            .ok_or_else(|| AppError::Validation {
                message: format!("Unknown relationship '{}'", raw),
                field: Some("relationship".to_string()),
            })
    }

    pub fn relationship(&self) -> Option<Relationship> {
        match self {
            RelationshipFilter::Auto => None,
            RelationshipFilter::Only(rel) => Some(*rel),
        }
    }

    /// Relationship assumed when a candidate claims nothing usable
    pub fn fallback_relationship(&self) -> Relationship {
        self.relationship().unwrap_or(Relationship::Similar)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipFilter::Auto => "auto",
            RelationshipFilter::Only(rel) => rel.as_str(),
        }
    }
}

impl fmt::Display for RelationshipFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Node extensions
// ============================================================================

pub const NODE_EXTENSIONS_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    NODE_EXTENSIONS_SCHEMA_VERSION
}

/// Typed view of a node's `extra_data` document.
///
/// Version 1 fields:
/// - `node_type`: display type of the node (`experiment` when absent)
/// - `method_aliases` (alias `methods`): method names and their aliases
/// - `dataset_metrics` (alias `datasets`): datasets and evaluation metrics
///
/// Unknown keys are kept in `other` so a round trip never loses data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExtensions {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    pub node_type: Option<String>,

    #[serde(default, alias = "methods")]
    pub method_aliases: Vec<String>,

    #[serde(default, alias = "datasets")]
    pub dataset_metrics: Vec<String>,

    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl Default for NodeExtensions {
    fn default() -> Self {
        Self {
            schema_version: NODE_EXTENSIONS_SCHEMA_VERSION,
            node_type: None,
            method_aliases: Vec::new(),
            dataset_metrics: Vec::new(),
            other: serde_json::Map::new(),
        }
    }
}

impl NodeExtensions {
    /// Decode a stored document. Missing or malformed blobs yield defaults.
    pub fn from_json(value: Option<&serde_json::Value>) -> Self {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return Self::default();
        };

        match serde_json::from_value::<NodeExtensions>(value.clone()) {
            Ok(ext) => {
                if ext.schema_version > NODE_EXTENSIONS_SCHEMA_VERSION {
                    tracing::debug!(
                        schema_version = ext.schema_version,
                        "Node extensions written by a newer schema, reading known fields"
                    );
                }
                ext
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed node extensions, using defaults");
                Self::default()
            }
        }
    }

    pub fn node_type(&self) -> &str {
        self.node_type.as_deref().unwrap_or("experiment")
    }
}

// ============================================================================
// Pipeline records
// ============================================================================

/// Compact research context of one node, rebuilt per request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResearchContext {
    pub node_id: i64,
    pub problem: String,
    pub description: Option<String>,
    pub motivation: Option<String>,
    pub expectations: Option<String>,
    pub hypothesis: Option<String>,
    /// `"title (relationship)"` per parent, in edge order
    pub parents_brief: Vec<String>,
    pub children_brief: Vec<String>,
    pub method_aliases: BTreeSet<String>,
    pub dataset_metrics: BTreeSet<String>,
}

/// Paper proposed by the generative service, untrusted until resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub title: String,
    /// DOI or index id, when the proposal carried one
    pub external_id: Option<String>,
    pub claimed_relationship: Relationship,
    pub justification: String,
}

/// How a work was matched in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedVia {
    Identifier,
    TitleSearch,
}

impl ResolvedVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedVia::Identifier => "identifier",
            ResolvedVia::TitleSearch => "title_search",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "identifier" => ResolvedVia::Identifier,
            _ => ResolvedVia::TitleSearch,
        }
    }
}

/// Candidate matched to a canonical bibliographic record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedWork {
    pub canonical_id: String,
    pub title: String,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub doi: Option<String>,
    pub url: String,
    pub cited_by_count: i64,
    pub is_open_access: bool,
    pub abstract_text: String,
    pub resolved_via: ResolvedVia,
}

impl ResolvedWork {
    pub fn from_record(record: WorkRecord, resolved_via: ResolvedVia) -> Self {
        Self {
            canonical_id: record.id,
            title: record.title,
            year: record.year,
            venue: record.venue,
            doi: record.doi,
            url: record.url,
            cited_by_count: record.cited_by_count,
            is_open_access: record.is_open_access,
            abstract_text: record.abstract_text,
            resolved_via,
        }
    }
}

/// Outcome of the existence check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub ok: bool,
    pub strength: f64,
    #[serde(default)]
    pub evidence: serde_json::Map<String, serde_json::Value>,
}

impl VerificationResult {
    pub fn failed(reason: &str) -> Self {
        let mut evidence = serde_json::Map::new();
        evidence.insert("reason".to_string(), serde_json::Value::from(reason));
        Self {
            ok: false,
            strength: 0.0,
            evidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub work: ResolvedWork,
    pub relationship: Relationship,
    pub score: f64,
    pub justification: String,
    pub verification: VerificationResult,
}

/// Echo of the base paper a directed suggestion was anchored to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseRef {
    pub canonical_id: String,
    pub title: String,
    pub doi: Option<String>,
    pub year: Option<i32>,
}

impl From<&ResolvedWork> for BaseRef {
    fn from(work: &ResolvedWork) -> Self {
        Self {
            canonical_id: work.canonical_id.clone(),
            title: work.title.clone(),
            doi: work.doi.clone(),
            year: work.year,
        }
    }
}

/// Accepted suggestion, the unit persisted to the recommendation log
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub id: Uuid,
    pub node_id: i64,
    pub work: ResolvedWork,
    /// Relationship the candidate claimed
    pub relationship: Relationship,
    /// Filter the request was made with
    pub requested: RelationshipFilter,
    pub score: f64,
    pub justification: String,
    pub verification: VerificationResult,
    pub summary: String,
    pub base: Option<BaseRef>,
    pub created_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn new(
        node_id: i64,
        selected: ScoredCandidate,
        requested: RelationshipFilter,
        summary: String,
        base: Option<BaseRef>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            node_id,
            work: selected.work,
            relationship: selected.relationship,
            requested,
            score: selected.score,
            justification: selected.justification,
            verification: selected.verification,
            summary,
            base,
            created_at: Utc::now(),
        }
    }

    /// Score rounded to 4 decimals
    pub fn confidence(&self) -> f64 {
        (self.score * 10_000.0).round() / 10_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_lookup_table() {
        assert_eq!(Relationship::lookup("similar"), Some(Relationship::Similar));
        assert_eq!(Relationship::lookup("Builds-On"), Some(Relationship::BuildsOn));
        assert_eq!(Relationship::lookup("builds on"), Some(Relationship::BuildsOn));
        assert_eq!(Relationship::lookup(" background "), Some(Relationship::Prior));
        assert_eq!(Relationship::lookup("refutes"), Some(Relationship::Contrast));
        assert_eq!(Relationship::lookup("auto"), None);
        assert_eq!(Relationship::lookup("nonsense"), None);
    }

    #[test]
    fn test_relationship_normalize_defaults_on_miss() {
        assert_eq!(
            Relationship::normalize("whatever", Relationship::Prior),
            Relationship::Prior
        );
        assert_eq!(
            Relationship::normalize("contrast", Relationship::Prior),
            Relationship::Contrast
        );
    }

    #[test]
    fn test_every_variant_round_trips_through_table() {
        for rel in Relationship::ALL {
            assert_eq!(Relationship::lookup(rel.as_str()), Some(rel));
        }
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!(RelationshipFilter::parse(None).unwrap(), RelationshipFilter::Auto);
        assert_eq!(RelationshipFilter::parse(Some("")).unwrap(), RelationshipFilter::Auto);
        assert_eq!(RelationshipFilter::parse(Some("AUTO")).unwrap(), RelationshipFilter::Auto);
        assert_eq!(
            RelationshipFilter::parse(Some("prior")).unwrap(),
            RelationshipFilter::Only(Relationship::Prior)
        );
        assert!(matches!(
            RelationshipFilter::parse(Some("sideways")),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn test_filter_fallback_relationship() {
        assert_eq!(RelationshipFilter::Auto.fallback_relationship(), Relationship::Similar);
        assert_eq!(
            RelationshipFilter::Only(Relationship::Contrast).fallback_relationship(),
            Relationship::Contrast
        );
    }

    #[test]
    fn test_node_extensions_decoding() {
        let value = serde_json::json!({
            "node_type": "analysis",
            "methods": ["BERT", "RoBERTa"],
            "datasets": ["GLUE/accuracy"],
            "pi_mission": "keep me"
        });
        let ext = NodeExtensions::from_json(Some(&value));

        assert_eq!(ext.schema_version, 1);
        assert_eq!(ext.node_type(), "analysis");
        assert_eq!(ext.method_aliases, vec!["BERT", "RoBERTa"]);
        assert_eq!(ext.dataset_metrics, vec!["GLUE/accuracy"]);
        assert_eq!(ext.other.get("pi_mission"), Some(&serde_json::json!("keep me")));
    }

    #[test]
    fn test_node_extensions_malformed_degrades_to_default() {
        let value = serde_json::json!({ "method_aliases": "not a list" });
        assert_eq!(NodeExtensions::from_json(Some(&value)), NodeExtensions::default());
        assert_eq!(NodeExtensions::from_json(None).node_type(), "experiment");
        assert_eq!(
            NodeExtensions::from_json(Some(&serde_json::json!([1, 2]))),
            NodeExtensions::default()
        );
    }

    #[test]
    fn test_confidence_rounding() {
        let work = ResolvedWork {
            canonical_id: "W1".to_string(),
            title: "T".to_string(),
            year: None,
            venue: None,
            doi: None,
            url: "https://openalex.org/W1".to_string(),
            cited_by_count: 0,
            is_open_access: false,
            abstract_text: String::new(),
            resolved_via: ResolvedVia::Identifier,
        };
        let rec = Recommendation::new(
            1,
            ScoredCandidate {
                work,
                relationship: Relationship::Similar,
                score: 0.123456,
                justification: String::new(),
                verification: VerificationResult::failed("test"),
            },
            RelationshipFilter::Auto,
            String::new(),
            None,
        );
        assert_eq!(rec.confidence(), 0.1235);
    }
}
