//! Candidate proposal
//!
//! Asks the generative service for up to `k` papers as strict JSON
//! (`{"papers": [{"title", "doi", "relationship", "why"}]}`). Any failure
//! (unreachable service, timeout, malformed or empty output) degrades to a
//! single deterministic candidate built from the node's problem statement.

use crate::model::{Candidate, Relationship, RelationshipFilter, ResearchContext, ResolvedWork};
use litgraph_common::errors::{AppError, Result};
use litgraph_common::llm::{strip_code_fences, GenerationRequest, Generator};
use litgraph_common::metrics;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const FALLBACK_TOPIC: &str = "Experiment topic";
const FALLBACK_WHY: &str = "Likely relevant based on node context.";
const FALLBACK_BASE_WHY: &str = "Related to the base paper and node.";

#[derive(Debug, Deserialize)]
struct RawProposal {
    #[serde(default)]
    papers: Vec<RawPaper>,
}

#[derive(Debug, Deserialize)]
struct RawPaper {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    relationship: Option<String>,
    #[serde(default)]
    why: Option<String>,
}

/// Candidates for one orchestration pass
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub candidates: Vec<Candidate>,
    /// True when the generative service was bypassed
    pub fallback: bool,
}

/// Parse the generative service output into at most `limit` candidates
pub fn parse_candidates(raw: &str, filter: RelationshipFilter, limit: usize) -> Result<Vec<Candidate>> {
    let proposal: RawProposal = serde_json::from_str(strip_code_fences(raw))?;
    let default_relationship = filter.fallback_relationship();

    Ok(proposal
        .papers
        .into_iter()
        .filter_map(|paper| {
            let title = paper.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
            Some(Candidate {
                title,
                external_id: paper.doi.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
                claimed_relationship: paper
                    .relationship
                    .as_deref()
                    .map(|r| Relationship::normalize(r, default_relationship))
                    .unwrap_or(default_relationship),
                justification: paper.why.unwrap_or_default().trim().to_string(),
            })
        })
        .take(limit)
        .collect())
}

fn topic(context: &ResearchContext) -> &str {
    if context.problem.is_empty() {
        FALLBACK_TOPIC
    } else {
        &context.problem
    }
}

/// Deterministic placeholder used when proposal fails
pub fn fallback_candidate(
    context: &ResearchContext,
    base: Option<&ResolvedWork>,
    filter: RelationshipFilter,
) -> Candidate {
    let (title, justification) = match base {
        Some(base) => (
            format!("{}: works related to {}", topic(context), base.title),
            FALLBACK_BASE_WHY,
        ),
        None => (format!("{}: survey and baselines", topic(context)), FALLBACK_WHY),
    };

    Candidate {
        title,
        external_id: None,
        claimed_relationship: filter.fallback_relationship(),
        justification: justification.to_string(),
    }
}

fn push_field(prompt: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value {
        let _ = writeln!(prompt, "{}: {}", label, value);
    }
}

fn push_list<'a>(prompt: &mut String, label: &str, items: impl IntoIterator<Item = &'a String>) {
    let items: Vec<&str> = items.into_iter().map(String::as_str).collect();
    if !items.is_empty() {
        let _ = writeln!(prompt, "{}: {}", label, items.join("; "));
    }
}

fn render_context(prompt: &mut String, context: &ResearchContext) {
    prompt.push_str("## Research node\n");
    push_field(prompt, "Problem", Some(topic(context)));
    push_field(prompt, "Description", context.description.as_deref());
    push_field(prompt, "Motivation", context.motivation.as_deref());
    push_field(prompt, "Expectations", context.expectations.as_deref());
    push_field(prompt, "Hypothesis", context.hypothesis.as_deref());
    push_list(prompt, "Upstream nodes", &context.parents_brief);
    push_list(prompt, "Downstream nodes", &context.children_brief);
    push_list(prompt, "Methods and aliases", &context.method_aliases);
    push_list(prompt, "Datasets and metrics", &context.dataset_metrics);
}

fn render_instructions(prompt: &mut String, filter: RelationshipFilter, k: usize) {
    let wanted = match filter {
        RelationshipFilter::Auto => {
            "whichever of similar, builds_on, prior, contrast fits best".to_string()
        }
        RelationshipFilter::Only(rel) => rel.as_str().to_string(),
    };

    let _ = write!(
        prompt,
        "\n## Task\n\
         Propose up to {k} real, published papers for this node. \
         Relationship wanted: {wanted}.\n\
         Only list papers you are confident exist. Include the DOI when known.\n\
         Answer with JSON only, shaped as:\n\
         {{\"papers\": [{{\"title\": \"...\", \"doi\": \"10.xxxx/... or null\", \
         \"relationship\": \"similar|builds_on|prior|contrast\", \"why\": \"one sentence\"}}]}}\n"
    );
}

pub fn context_prompt(context: &ResearchContext, filter: RelationshipFilter, k: usize) -> String {
    let mut prompt = String::from("You recommend scientific literature for a research experiment graph.\n\n");
    render_context(&mut prompt, context);
    render_instructions(&mut prompt, filter, k);
    prompt
}

pub fn base_prompt(
    context: &ResearchContext,
    base: &ResolvedWork,
    filter: RelationshipFilter,
    k: usize,
) -> String {
    let mut prompt = String::from("You recommend scientific literature for a research experiment graph.\n\n");
    render_context(&mut prompt, context);

    prompt.push_str("\n## Base paper\n");
    push_field(&mut prompt, "Title", Some(&base.title));
    push_field(&mut prompt, "DOI", base.doi.as_deref());
    push_field(&mut prompt, "Index id", Some(&base.canonical_id));
    let year = base.year.map(|y| y.to_string()).unwrap_or_else(|| "unknown".to_string());
    push_field(&mut prompt, "Year", Some(&year));
    prompt.push_str(
        "Papers must relate to the base paper. A `prior` paper was published before it; \
         a `builds_on` paper was published in or after its year.\n",
    );

    render_instructions(&mut prompt, filter, k);
    prompt
}

/// Candidate proposer over a generative service
#[derive(Clone)]
pub struct Proposer {
    generator: Arc<dyn Generator>,
    max_candidates: usize,
    temperature: f32,
    timeout: Duration,
}

impl Proposer {
    pub fn new(
        generator: Arc<dyn Generator>,
        max_candidates: usize,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            max_candidates: max_candidates.max(1),
            temperature,
            timeout,
        }
    }

    pub async fn propose_from_context(
        &self,
        context: &ResearchContext,
        filter: RelationshipFilter,
    ) -> Proposal {
        let prompt = context_prompt(context, filter, self.max_candidates);
        self.propose(prompt, filter, || fallback_candidate(context, None, filter))
            .await
    }

    pub async fn propose_from_base(
        &self,
        context: &ResearchContext,
        base: &ResolvedWork,
        filter: RelationshipFilter,
    ) -> Proposal {
        let prompt = base_prompt(context, base, filter, self.max_candidates);
        self.propose(prompt, filter, || fallback_candidate(context, Some(base), filter))
            .await
    }

    async fn propose(
        &self,
        prompt: String,
        filter: RelationshipFilter,
        fallback: impl FnOnce() -> Candidate,
    ) -> Proposal {
        match self.request(prompt, filter).await {
            Ok(candidates) if !candidates.is_empty() => {
                debug!(count = candidates.len(), "Candidates proposed");
                metrics::record_candidates_proposed(candidates.len(), false);
                Proposal { candidates, fallback: false }
            }
            Ok(_) => {
                warn!("Generative service proposed no usable candidates, using fallback");
                self.fallback(fallback)
            }
            Err(e) => {
                let degraded = AppError::ExternalServiceDegraded {
                    service: "generative".to_string(),
                    message: e.to_string(),
                };
                warn!(error = %degraded, "Candidate proposal failed, using fallback");
                self.fallback(fallback)
            }
        }
    }

    fn fallback(&self, fallback: impl FnOnce() -> Candidate) -> Proposal {
        metrics::record_fallback("proposal");
        metrics::record_candidates_proposed(1, true);
        Proposal {
            candidates: vec![fallback()],
            fallback: true,
        }
    }

    async fn request(&self, prompt: String, filter: RelationshipFilter) -> Result<Vec<Candidate>> {
        let request = GenerationRequest::json(prompt, self.temperature);
        let raw = tokio::time::timeout(self.timeout, self.generator.generate(&request))
            .await
            .map_err(|_| AppError::Timeout {
                service: "generative".to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        parse_candidates(&raw, filter, self.max_candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{work, ScriptedGenerator};
    use crate::model::ResolvedVia;

    fn context() -> ResearchContext {
        ResearchContext {
            node_id: 7,
            problem: "Sparse attention for long documents".to_string(),
            hypothesis: Some("Block sparsity keeps accuracy".to_string()),
            parents_brief: vec!["Dense baseline (leads_to)".to_string()],
            ..Default::default()
        }
    }

    fn proposer(generator: ScriptedGenerator) -> Proposer {
        Proposer::new(Arc::new(generator), 12, 0.2, Duration::from_secs(5))
    }

    #[test]
    fn test_parse_candidates() {
        let raw = r#"```json
        {"papers": [
            {"title": "Longformer", "doi": "10.48550/arXiv.2004.05150", "relationship": "builds on", "why": "Sparse attention"},
            {"title": "  ", "relationship": "similar"},
            {"title": "BigBird", "doi": null, "why": "Block sparse"},
            {"title": "Reformer", "relationship": "???"}
        ]}
        ```"#;

        let filter = RelationshipFilter::Only(Relationship::Contrast);
        let candidates = parse_candidates(raw, filter, 12).unwrap();

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].title, "Longformer");
        assert_eq!(candidates[0].external_id.as_deref(), Some("10.48550/arXiv.2004.05150"));
        assert_eq!(candidates[0].claimed_relationship, Relationship::BuildsOn);
        assert_eq!(candidates[1].external_id, None);
        // Missing or unknown claims fall back to the requested relationship
        assert_eq!(candidates[1].claimed_relationship, Relationship::Contrast);
        assert_eq!(candidates[2].claimed_relationship, Relationship::Contrast);
    }

    #[test]
    fn test_parse_caps_at_limit() {
        let papers: Vec<String> = (0..20)
            .map(|i| format!(r#"{{"title": "Paper {}", "relationship": "similar"}}"#, i))
            .collect();
        let raw = format!(r#"{{"papers": [{}]}}"#, papers.join(","));
        assert_eq!(parse_candidates(&raw, RelationshipFilter::Auto, 12).unwrap().len(), 12);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_candidates("Here are some papers!", RelationshipFilter::Auto, 12).is_err());
    }

    #[tokio::test]
    async fn test_malformed_output_yields_exactly_one_fallback() {
        let proposal = proposer(ScriptedGenerator::new().respond("not json at all"))
            .propose_from_context(&context(), RelationshipFilter::Auto)
            .await;

        assert!(proposal.fallback);
        assert_eq!(proposal.candidates.len(), 1);
        let candidate = &proposal.candidates[0];
        assert_eq!(candidate.title, "Sparse attention for long documents: survey and baselines");
        assert_eq!(candidate.claimed_relationship, Relationship::Similar);
        assert_eq!(candidate.external_id, None);
    }

    #[tokio::test]
    async fn test_service_failure_and_empty_list_fall_back() {
        let filter = RelationshipFilter::Only(Relationship::Prior);

        let failed = proposer(ScriptedGenerator::new().fail())
            .propose_from_context(&context(), filter)
            .await;
        assert!(failed.fallback);
        assert_eq!(failed.candidates[0].claimed_relationship, Relationship::Prior);

        let empty = proposer(ScriptedGenerator::new().respond(r#"{"papers": []}"#))
            .propose_from_context(&context(), filter)
            .await;
        assert!(empty.fallback);
        assert_eq!(empty.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_slow_service_times_out_to_fallback() {
        let generator = ScriptedGenerator::new()
            .respond(r#"{"papers": [{"title": "Late", "relationship": "similar"}]}"#)
            .with_delay(Duration::from_millis(200));
        let proposer = Proposer::new(Arc::new(generator), 12, 0.2, Duration::from_millis(20));

        let proposal = proposer.propose_from_context(&context(), RelationshipFilter::Auto).await;
        assert!(proposal.fallback);
    }

    #[tokio::test]
    async fn test_base_fallback_mentions_base_title() {
        let base = ResolvedWork::from_record(work("W1", "Attention Is All You Need", Some(2017)), ResolvedVia::Identifier);
        let proposal = proposer(ScriptedGenerator::new().fail())
            .propose_from_base(&context(), &base, RelationshipFilter::Auto)
            .await;

        assert_eq!(proposal.candidates.len(), 1);
        assert!(proposal.candidates[0].title.starts_with("Sparse attention for long documents"));
        assert!(proposal.candidates[0].title.contains("Attention Is All You Need"));
        assert_eq!(proposal.candidates[0].justification, FALLBACK_BASE_WHY);
    }

    #[tokio::test]
    async fn test_prompt_is_sent_as_json_request() {
        let generator = Arc::new(
            ScriptedGenerator::new().respond(r#"{"papers": [{"title": "A", "relationship": "prior"}]}"#),
        );
        let proposer = Proposer::new(generator.clone(), 5, 0.2, Duration::from_secs(5));
        let proposal = proposer
            .propose_from_context(&context(), RelationshipFilter::Only(Relationship::Prior))
            .await;

        assert!(!proposal.fallback);
        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_output);
        assert!(requests[0].prompt.contains("Sparse attention for long documents"));
        assert!(requests[0].prompt.contains("Relationship wanted: prior"));
        assert!(requests[0].prompt.contains("up to 5 real"));
    }

    #[test]
    fn test_base_prompt_mentions_year() {
        let base = ResolvedWork::from_record(work("W1", "Base", None), ResolvedVia::Identifier);
        let prompt = base_prompt(&context(), &base, RelationshipFilter::Auto, 12);
        assert!(prompt.contains("Year: unknown"));
        assert!(prompt.contains("Index id: W1"));
    }
}
