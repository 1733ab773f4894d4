//! Recommendation orchestrator
//!
//! Drives one suggestion through
//! `ContextBuilt -> CandidatesProposed -> Verifying -> Scoring -> Selected | Exhausted`:
//!
//! 1. Assemble the node's research context (fails with `NodeNotFound`)
//! 2. Resolve the base paper when one is given (fails with `BaseUnresolvable`)
//! 3. Propose candidates
//! 4. Resolve and verify candidates concurrently, dropping unresolved,
//!    excluded and unverified ones
//! 5. Drop base-anchored candidates that break the temporal rule
//! 6. Score survivors and keep the best, first proposed winning ties
//! 7. If nothing survived, run 3-6 once more with exclusions cleared,
//!    then fail with `NoCandidate`
//! 8. Summarize the selected abstract
//! 9. Append the recommendation to the cache

use crate::cache::RecommendationCache;
use crate::context::{ContextAssembler, GraphStore};
use crate::graph;
use crate::model::{
    BaseRef, Candidate, Recommendation, Relationship, RelationshipFilter, ResearchContext,
    ResolvedWork, ScoredCandidate,
};
use crate::proposer::Proposer;
use crate::resolver::{BaseReference, Resolver};
use crate::scorer::{self, Scorer};
use crate::summary::Summarizer;
use futures::stream::{self, StreamExt};
use litgraph_common::bibliography::{normalize_work_id, BibliographicIndex};
use litgraph_common::config::AppConfig;
use litgraph_common::errors::{AppError, Result};
use litgraph_common::llm::Generator;
use litgraph_common::metrics;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Pipeline states, logged as the orchestration advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    ContextBuilt,
    CandidatesProposed,
    Verifying,
    Scoring,
    Selected,
    Exhausted,
}

fn enter(state: PipelineState) {
    debug!(state = ?state, "Pipeline state");
}

/// `prior` must predate the base, `builds_on` must not. Unknown years pass.
pub fn violates_temporal(
    relationship: Relationship,
    candidate_year: Option<i32>,
    base_year: Option<i32>,
) -> bool {
    let (Some(candidate), Some(base)) = (candidate_year, base_year) else {
        return false;
    };

    match relationship {
        Relationship::Prior => candidate >= base,
        Relationship::BuildsOn => candidate < base,
        Relationship::Similar | Relationship::Contrast => false,
    }
}

/// Canonical ids the caller does not want suggested
#[derive(Debug, Clone, Default)]
struct Exclusions(HashSet<String>);

impl Exclusions {
    fn new(ids: &[String]) -> Self {
        let mut set = HashSet::new();
        for id in ids.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            set.insert(id.to_string());
            if let Some(short) = normalize_work_id(id) {
                set.insert(short);
            }
        }
        Self(set)
    }

    fn contains(&self, work: &ResolvedWork) -> bool {
        self.0.contains(&work.canonical_id)
            || normalize_work_id(&work.canonical_id).is_some_and(|short| self.0.contains(&short))
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn outcome_label(result: &Result<Recommendation>) -> &'static str {
    match result {
        Ok(_) => "selected",
        Err(AppError::NoCandidate { .. }) => "no_candidate",
        Err(AppError::NodeNotFound { .. }) => "node_not_found",
        Err(AppError::BaseUnresolvable { .. }) => "base_unresolvable",
        Err(_) => "error",
    }
}

/// Literature recommendation orchestrator
#[derive(Clone)]
pub struct Orchestrator {
    assembler: ContextAssembler,
    proposer: Proposer,
    resolver: Resolver,
    scorer: Scorer,
    summarizer: Summarizer,
    cache: Arc<dyn RecommendationCache>,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        generator: Arc<dyn Generator>,
        index: Arc<dyn BibliographicIndex>,
        cache: Arc<dyn RecommendationCache>,
        config: &AppConfig,
    ) -> Self {
        let recommender = &config.recommender;
        let generative_timeout = config.generative_timeout();

        Self {
            assembler: ContextAssembler::new(graph),
            proposer: Proposer::new(
                generator.clone(),
                recommender.max_candidates,
                config.generative.proposal_temperature,
                generative_timeout,
            ),
            resolver: Resolver::new(index, config.bibliography_timeout()),
            scorer: Scorer::from(recommender),
            summarizer: Summarizer::new(
                generator,
                config.generative.summary_temperature,
                generative_timeout,
                recommender.summary_max_chars,
            ),
            cache,
            concurrency: recommender.concurrency.clamp(1, recommender.max_candidates.max(1)),
        }
    }

    /// Suggest one verified paper for a node
    #[instrument(skip(self, filter, exclude_ids), fields(filter = %filter, excluded = exclude_ids.len()))]
    pub async fn suggest_one(
        &self,
        node_id: i64,
        filter: RelationshipFilter,
        exclude_ids: &[String],
    ) -> Result<Recommendation> {
        let start = Instant::now();
        let result = self.run(node_id, None, filter, exclude_ids).await;
        metrics::record_recommendation(start.elapsed().as_secs_f64(), outcome_label(&result), false);
        result
    }

    /// Suggest one verified paper anchored to a base paper
    #[instrument(skip(self, filter, exclude_ids), fields(filter = %filter, excluded = exclude_ids.len()))]
    pub async fn suggest_one_from_base(
        &self,
        node_id: i64,
        base: &str,
        filter: RelationshipFilter,
        exclude_ids: &[String],
    ) -> Result<Recommendation> {
        let start = Instant::now();
        let result = self.run(node_id, Some(base), filter, exclude_ids).await;
        metrics::record_recommendation(start.elapsed().as_secs_f64(), outcome_label(&result), true);
        result
    }

    /// Most recent cached recommendation matching the filter
    pub async fn get_cached(
        &self,
        node_id: i64,
        filter: RelationshipFilter,
    ) -> Result<Option<Recommendation>> {
        let cached = self.cache.get_latest(node_id, filter).await?;
        metrics::record_cache(cached.is_some(), "recommendation");
        Ok(cached)
    }

    /// Like [`Orchestrator::get_cached`], but a row whose work the caller
    /// excluded is treated as a miss
    pub async fn get_cached_excluding(
        &self,
        node_id: i64,
        filter: RelationshipFilter,
        exclude_ids: &[String],
    ) -> Result<Option<Recommendation>> {
        let exclusions = Exclusions::new(exclude_ids);
        Ok(self
            .get_cached(node_id, filter)
            .await?
            .filter(|rec| !exclusions.contains(&rec.work)))
    }

    /// Node ids under `node_id`, itself included
    pub async fn subgraph(&self, node_id: i64) -> Result<Vec<i64>> {
        graph::subgraph(self.assembler.store().as_ref(), node_id).await
    }

    async fn run(
        &self,
        node_id: i64,
        base: Option<&str>,
        filter: RelationshipFilter,
        exclude_ids: &[String],
    ) -> Result<Recommendation> {
        let context = self.assembler.assemble(node_id).await?;
        enter(PipelineState::ContextBuilt);

        let base = match base {
            Some(raw) => Some(self.resolve_base(raw).await?),
            None => None,
        };

        let exclusions = Exclusions::new(exclude_ids);
        let selected = match self.select(&context, base.as_ref(), filter, &exclusions).await {
            Some(selected) => selected,
            None => {
                info!(
                    node_id = node_id,
                    had_exclusions = !exclusions.is_empty(),
                    "No candidate survived, retrying with exclusions cleared"
                );
                metrics::record_exclusion_reset();

                match self.select(&context, base.as_ref(), filter, &Exclusions::default()).await {
                    Some(selected) => selected,
                    None => {
                        enter(PipelineState::Exhausted);
                        return Err(AppError::NoCandidate { node_id });
                    }
                }
            }
        };
        enter(PipelineState::Selected);

        info!(
            node_id = node_id,
            work = %selected.work.canonical_id,
            relationship = %selected.relationship,
            score = selected.score,
            "Candidate selected"
        );

        let summary = self.summarizer.summarize(&selected.work.abstract_text).await;
        let recommendation = Recommendation::new(
            node_id,
            selected,
            filter,
            summary,
            base.as_ref().map(BaseRef::from),
        );

        if let Err(e) = self.cache.put(&recommendation).await {
            warn!(node_id = node_id, error = %e, "Failed to persist recommendation");
        }

        Ok(recommendation)
    }

    async fn resolve_base(&self, raw: &str) -> Result<ResolvedWork> {
        let reference = BaseReference::parse(raw);
        let unresolvable = || AppError::BaseUnresolvable {
            reference: raw.trim().to_string(),
        };

        if reference.text.is_empty() {
            return Err(unresolvable());
        }

        let base = self.resolver.resolve_base(&reference).await.ok_or_else(unresolvable)?;
        if !self.resolver.verify(Some(&base)).ok {
            return Err(unresolvable());
        }

        debug!(base = %base.canonical_id, year = ?base.year, "Base resolved");
        Ok(base)
    }

    /// Steps 3-6: propose, resolve, filter, score and pick the best candidate
    async fn select(
        &self,
        context: &ResearchContext,
        base: Option<&ResolvedWork>,
        filter: RelationshipFilter,
        exclusions: &Exclusions,
    ) -> Option<ScoredCandidate> {
        let proposal = match base {
            Some(base) => self.proposer.propose_from_base(context, base, filter).await,
            None => self.proposer.propose_from_context(context, filter).await,
        };
        enter(PipelineState::CandidatesProposed);
        debug!(
            count = proposal.candidates.len(),
            fallback = proposal.fallback,
            "Candidates proposed"
        );

        enter(PipelineState::Verifying);
        let resolver = &self.resolver;
        // `buffered` yields in input order, so proposal order survives concurrency
        let resolved: Vec<(usize, Candidate, Option<ResolvedWork>)> =
            stream::iter(proposal.candidates.into_iter().enumerate())
                .map(|(idx, candidate)| async move {
                    let work = resolver
                        .resolve(candidate.external_id.as_deref(), &candidate.title)
                        .await;
                    (idx, candidate, work)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        enter(PipelineState::Scoring);
        let mut best: Option<ScoredCandidate> = None;

        for (idx, candidate, work) in resolved {
            let Some(work) = work else {
                debug!(candidate = idx, title = %candidate.title, "Unresolved, dropping");
                metrics::record_candidate_dropped("unresolved");
                continue;
            };

            if exclusions.contains(&work) {
                debug!(candidate = idx, work = %work.canonical_id, "Excluded, dropping");
                metrics::record_candidate_dropped("excluded");
                continue;
            }

            let verification = self.resolver.verify(Some(&work));
            if !verification.ok {
                debug!(candidate = idx, "Verification failed, dropping");
                metrics::record_candidate_dropped("unverified");
                continue;
            }

            if let Some(base) = base {
                if violates_temporal(candidate.claimed_relationship, work.year, base.year) {
                    debug!(
                        candidate = idx,
                        relationship = %candidate.claimed_relationship,
                        year = ?work.year,
                        base_year = ?base.year,
                        "Temporal constraint violated, dropping"
                    );
                    metrics::record_candidate_dropped("temporal");
                    continue;
                }
            }

            let relevance = scorer::relevance(context, &work.title);
            let score = self
                .scorer
                .score(relevance, verification.strength, work.year, work.is_open_access);
            debug!(candidate = idx, work = %work.canonical_id, relevance = relevance, score = score, "Scored");

            // Strictly greater: the earliest proposal keeps a tie
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(ScoredCandidate {
                    work,
                    relationship: candidate.claimed_relationship,
                    score,
                    justification: candidate.justification,
                    verification,
                });
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryRecommendationCache;
    use crate::testing::{work, FakeIndex, InMemoryGraph, ScriptedGenerator};
    use litgraph_common::bibliography::WorkRecord;
    use std::time::Duration;

    struct Harness {
        orchestrator: Orchestrator,
        cache: Arc<InMemoryRecommendationCache>,
        generator: Arc<ScriptedGenerator>,
        index: Arc<FakeIndex>,
    }

    fn graph() -> InMemoryGraph {
        let graph = InMemoryGraph::new();
        graph.add_node(7, "Sparse attention for long documents");
        graph.add_node(8, "Dense baseline");
        graph.add_edge(8, 7, "leads_to");
        graph
    }

    fn harness(generator: ScriptedGenerator, index: FakeIndex) -> Harness {
        harness_with(&AppConfig::default(), generator, index)
    }

    fn harness_with(config: &AppConfig, generator: ScriptedGenerator, index: FakeIndex) -> Harness {
        let cache = Arc::new(InMemoryRecommendationCache::new());
        let generator = Arc::new(generator);
        let index = Arc::new(index);
        let orchestrator = Orchestrator::new(
            Arc::new(graph()),
            generator.clone(),
            index.clone(),
            cache.clone(),
            config,
        );
        Harness { orchestrator, cache, generator, index }
    }

    /// `count` distinct candidates, each resolvable after `delay`
    fn slow_candidates(count: usize, delay: Duration) -> (ScriptedGenerator, FakeIndex) {
        let titles: Vec<String> = (0..count).map(|i| format!("Paper {}", i)).collect();
        let entries: Vec<(&str, &str)> = titles.iter().map(|t| (t.as_str(), "similar")).collect();

        let mut index = FakeIndex::new().with_delay(delay);
        for (i, title) in titles.iter().enumerate() {
            index = index.with_search(title, vec![work(&format!("W{}", i + 1), title, Some(2021))]);
        }
        (ScriptedGenerator::new().respond(&papers(&entries)), index)
    }

    fn papers(entries: &[(&str, &str)]) -> String {
        let papers: Vec<serde_json::Value> = entries
            .iter()
            .map(|(title, rel)| serde_json::json!({ "title": title, "relationship": rel, "why": format!("why {}", title) }))
            .collect();
        serde_json::json!({ "papers": papers }).to_string()
    }

    fn oa(mut record: WorkRecord) -> WorkRecord {
        record.is_open_access = true;
        record
    }

    #[test]
    fn test_temporal_rule() {
        assert!(violates_temporal(Relationship::Prior, Some(2023), Some(2020)));
        assert!(violates_temporal(Relationship::Prior, Some(2020), Some(2020)));
        assert!(!violates_temporal(Relationship::Prior, Some(2019), Some(2020)));
        assert!(violates_temporal(Relationship::BuildsOn, Some(2019), Some(2020)));
        assert!(!violates_temporal(Relationship::BuildsOn, Some(2020), Some(2020)));
        assert!(!violates_temporal(Relationship::Prior, None, Some(2020)));
        assert!(!violates_temporal(Relationship::BuildsOn, Some(2000), None));
        assert!(!violates_temporal(Relationship::Contrast, Some(2030), Some(2020)));
    }

    #[test]
    fn test_exclusions_accept_short_and_full_ids() {
        let exclusions = Exclusions::new(&["W1".to_string(), " https://openalex.org/W2 ".to_string(), "".to_string()]);
        let full = ResolvedWork::from_record(work("https://openalex.org/W1", "A", None), crate::model::ResolvedVia::Identifier);
        let short = ResolvedWork::from_record(work("W2", "B", None), crate::model::ResolvedVia::Identifier);
        let other = ResolvedWork::from_record(work("W3", "C", None), crate::model::ResolvedVia::Identifier);
        assert!(exclusions.contains(&full));
        assert!(exclusions.contains(&short));
        assert!(!exclusions.contains(&other));
    }

    #[tokio::test]
    async fn test_single_resolvable_candidate_is_recommended() {
        let generator = ScriptedGenerator::new()
            .respond(&papers(&[("X", "similar")]))
            .summarize_with("A one-line summary.");
        let mut record = oa(work("W1", "X", Some(2022)));
        record.abstract_text = "Abstract of X".to_string();
        let index = FakeIndex::new().with_search("X", vec![record]);

        let h = harness(generator, index);
        let rec = h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &[]).await.unwrap();

        assert_eq!(rec.work.canonical_id, "W1");
        assert_eq!(rec.relationship, Relationship::Similar);
        assert!(rec.verification.ok);
        assert!(rec.confidence() > 0.0);
        assert!((0.0..=1.0).contains(&rec.score));
        assert_eq!(rec.summary, "A one-line summary.");
        assert_eq!(rec.justification, "why X");
        assert_eq!(rec.base, None);

        // Persisted exactly once
        let stored = h.cache.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], rec);
    }

    #[tokio::test]
    async fn test_best_score_wins() {
        // "Sparse attention" matches two context keywords; "Cooking" none
        let generator = ScriptedGenerator::new().respond(&papers(&[
            ("Cooking at scale", "similar"),
            ("Sparse attention transformers", "similar"),
        ]));
        let index = FakeIndex::new()
            .with_search("Cooking at scale", vec![work("W1", "Cooking at scale", Some(2022))])
            .with_search(
                "Sparse attention transformers",
                vec![work("W2", "Sparse attention transformers", Some(2022))],
            );

        let h = harness(generator, index);
        let rec = h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &[]).await.unwrap();
        assert_eq!(rec.work.canonical_id, "W2");
    }

    #[tokio::test]
    async fn test_ties_go_to_first_proposed_even_when_it_resolves_last() {
        let generator = ScriptedGenerator::new().respond(&papers(&[("Alpha", "similar"), ("Beta", "similar")]));
        let index = FakeIndex::new()
            .with_search("Alpha", vec![work("W1", "Alpha", Some(2020))])
            .with_search("Beta", vec![work("W2", "Beta", Some(2020))])
            .delay_search("Alpha", Duration::from_millis(50));

        let h = harness(generator, index);
        let rec = h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &[]).await.unwrap();
        assert_eq!(rec.work.canonical_id, "W1");
    }

    #[tokio::test]
    async fn test_claimed_relationship_is_kept() {
        let generator = ScriptedGenerator::new().respond(&papers(&[("X", "contrast")]));
        let index = FakeIndex::new().with_search("X", vec![work("W1", "X", Some(2021))]);

        let h = harness(generator, index);
        let rec = h
            .orchestrator
            .suggest_one(7, RelationshipFilter::Only(Relationship::Prior), &[])
            .await
            .unwrap();

        assert_eq!(rec.relationship, Relationship::Contrast);
        assert_eq!(rec.requested, RelationshipFilter::Only(Relationship::Prior));
    }

    #[tokio::test]
    async fn test_unresolved_candidates_are_dropped() {
        let generator = ScriptedGenerator::new().respond(&papers(&[("Ghost", "similar"), ("Real", "similar")]));
        let index = FakeIndex::new().with_search("Real", vec![work("W5", "Real", None)]);

        let h = harness(generator, index);
        let rec = h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &[]).await.unwrap();
        assert_eq!(rec.work.canonical_id, "W5");
    }

    #[tokio::test]
    async fn test_unknown_node_fails_fast() {
        let h = harness(ScriptedGenerator::new(), FakeIndex::new());
        let result = h.orchestrator.suggest_one(999, RelationshipFilter::Auto, &[]).await;

        assert!(matches!(result, Err(AppError::NodeNotFound { id: 999 })));
        assert!(h.generator.requests().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_proposal_still_runs_fallback_candidate() {
        let fallback_title = "Sparse attention for long documents: survey and baselines";
        let generator = ScriptedGenerator::new().respond("{{{ definitely not json");
        let index = FakeIndex::new().with_search(fallback_title, vec![work("W42", "A survey", Some(2019))]);

        let h = harness(generator, index);
        let rec = h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &[]).await.unwrap();

        assert_eq!(rec.work.canonical_id, "W42");
        assert_eq!(rec.relationship, Relationship::Similar);
        // Summary service also unavailable: empty abstract placeholder
        assert_eq!(rec.summary, "Related work and summary");
    }

    #[tokio::test]
    async fn test_exclusions_reset_returns_excluded_candidate() {
        let generator = ScriptedGenerator::new().respond(&papers(&[("A", "similar"), ("B", "similar")]));
        let index = FakeIndex::new()
            .with_search("A", vec![work("https://openalex.org/W1", "A", Some(2020))])
            .with_search("B", vec![work("https://openalex.org/W2", "B", Some(2020))]);

        let h = harness(generator, index);
        let exclude = vec!["W1".to_string(), "https://openalex.org/W2".to_string()];
        let rec = h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &exclude).await.unwrap();

        assert_eq!(rec.work.canonical_id, "https://openalex.org/W1");
        // One proposal per pass
        assert_eq!(h.generator.requests().iter().filter(|r| r.json_output).count(), 2);
    }

    #[tokio::test]
    async fn test_partial_exclusion_needs_no_retry() {
        let generator = ScriptedGenerator::new().respond(&papers(&[("A", "similar"), ("B", "similar")]));
        let index = FakeIndex::new()
            .with_search("A", vec![work("W1", "A", Some(2020))])
            .with_search("B", vec![work("W2", "B", Some(2020))]);

        let h = harness(generator, index);
        let rec = h
            .orchestrator
            .suggest_one(7, RelationshipFilter::Auto, &["W1".to_string()])
            .await
            .unwrap();

        assert_eq!(rec.work.canonical_id, "W2");
        assert_eq!(h.generator.requests().iter().filter(|r| r.json_output).count(), 1);
    }

    #[tokio::test]
    async fn test_nothing_resolvable_is_no_candidate_after_one_retry() {
        let generator = ScriptedGenerator::new().respond(&papers(&[("Nowhere", "similar")]));
        let h = harness(generator, FakeIndex::new());

        let result = h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &[]).await;
        assert!(matches!(result, Err(AppError::NoCandidate { node_id: 7 })));
        assert_eq!(h.generator.requests().iter().filter(|r| r.json_output).count(), 2);
        assert!(h.cache.all().is_empty());
    }

    #[tokio::test]
    async fn test_from_base_drops_prior_that_postdates_base() {
        let generator = ScriptedGenerator::new().respond(&papers(&[("Later work", "prior")]));
        let index = FakeIndex::new()
            .with_id("W100", work("https://openalex.org/W100", "Base paper", Some(2020)))
            .with_search("Later work", vec![work("W5", "Later work", Some(2023))]);

        let h = harness(generator, index);
        let result = h
            .orchestrator
            .suggest_one_from_base(7, "https://openalex.org/W100", RelationshipFilter::Only(Relationship::Prior), &[])
            .await;

        assert!(matches!(result, Err(AppError::NoCandidate { .. })));
    }

    #[tokio::test]
    async fn test_from_base_prior_never_postdates_base() {
        let generator = ScriptedGenerator::new().respond(&papers(&[
            ("Newer", "prior"),
            ("Same year", "prior"),
            ("Older", "prior"),
            ("Undated", "prior"),
        ]));
        let index = FakeIndex::new()
            .with_doi("10.1000/base", work("W100", "Base paper", Some(2020)))
            .with_search("Newer", vec![oa(work("W1", "Newer", Some(2024)))])
            .with_search("Same year", vec![oa(work("W2", "Same year", Some(2020)))])
            .with_search("Older", vec![work("W3", "Older", Some(2016))])
            .with_search("Undated", vec![work("W4", "Undated", None)]);

        let h = harness(generator, index);
        let rec = h
            .orchestrator
            .suggest_one_from_base(7, "https://doi.org/10.1000/base", RelationshipFilter::Only(Relationship::Prior), &[])
            .await
            .unwrap();

        // Older scores 0.45*0.2 + 0.35 + 0.10*0.1; Undated 0.45*0.2 + 0.35 + 0.10*0.3
        assert_eq!(rec.work.canonical_id, "W4");
        let base = rec.base.unwrap();
        assert_eq!(base.canonical_id, "W100");
        assert_eq!(base.year, Some(2020));
    }

    #[tokio::test]
    async fn test_from_base_builds_on_must_not_predate_base() {
        let generator = ScriptedGenerator::new().respond(&papers(&[("Earlier", "builds_on"), ("Follow-up", "builds_on")]));
        let index = FakeIndex::new()
            .with_search("Base paper title", vec![work("W100", "Base paper title", Some(2020))])
            .with_search("Earlier", vec![oa(work("W1", "Earlier", Some(2018)))])
            .with_search("Follow-up", vec![work("W2", "Follow-up", Some(2020))]);

        let h = harness(generator, index);
        let rec = h
            .orchestrator
            .suggest_one_from_base(7, "Base paper title", RelationshipFilter::Only(Relationship::BuildsOn), &[])
            .await
            .unwrap();

        assert_eq!(rec.work.canonical_id, "W2");
        assert_eq!(rec.relationship, Relationship::BuildsOn);
    }

    #[tokio::test]
    async fn test_unresolvable_base_is_rejected_before_proposal() {
        let h = harness(ScriptedGenerator::new(), FakeIndex::new());

        let result = h
            .orchestrator
            .suggest_one_from_base(7, "https://doi.org/10.9999/missing", RelationshipFilter::Auto, &[])
            .await;
        assert!(matches!(result, Err(AppError::BaseUnresolvable { .. })));

        let blank = h.orchestrator.suggest_one_from_base(7, "   ", RelationshipFilter::Auto, &[]).await;
        assert!(matches!(blank, Err(AppError::BaseUnresolvable { .. })));

        assert!(h.generator.requests().is_empty());
    }

    #[tokio::test]
    async fn test_index_outage_ends_in_no_candidate() {
        let generator = ScriptedGenerator::new().respond(&papers(&[("X", "similar")]));
        let h = harness(generator, FakeIndex::new().failing());

        let result = h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &[]).await;
        assert!(matches!(result, Err(AppError::NoCandidate { .. })));
    }

    #[tokio::test]
    async fn test_get_cached_returns_latest() {
        let generator = ScriptedGenerator::new()
            .respond(&papers(&[("First", "similar")]))
            .respond(&papers(&[("Second", "prior")]));
        let index = FakeIndex::new()
            .with_search("First", vec![work("W1", "First", Some(2020))])
            .with_search("Second", vec![work("W2", "Second", Some(2020))]);

        let h = harness(generator, index);
        assert!(h.orchestrator.get_cached(7, RelationshipFilter::Auto).await.unwrap().is_none());

        tokio_test::assert_ok!(h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &[]).await);
        tokio_test::assert_ok!(h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &[]).await);

        let latest = h.orchestrator.get_cached(7, RelationshipFilter::Auto).await.unwrap().unwrap();
        assert_eq!(latest.work.canonical_id, "W2");

        let similar = h
            .orchestrator
            .get_cached(7, RelationshipFilter::Only(Relationship::Similar))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(similar.work.canonical_id, "W1");
    }

    #[tokio::test]
    async fn test_cached_read_skips_excluded_work() {
        let generator = ScriptedGenerator::new().respond(&papers(&[("X", "similar")]));
        let index = FakeIndex::new().with_search("X", vec![work("https://openalex.org/W1", "X", Some(2020))]);

        let h = harness(generator, index);
        tokio_test::assert_ok!(h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &[]).await);

        let kept = h
            .orchestrator
            .get_cached_excluding(7, RelationshipFilter::Auto, &["W2".to_string()])
            .await
            .unwrap();
        assert!(kept.is_some());

        for excluded in ["W1", "https://openalex.org/W1"] {
            let skipped = h
                .orchestrator
                .get_cached_excluding(7, RelationshipFilter::Auto, &[excluded.to_string()])
                .await
                .unwrap();
            assert!(skipped.is_none(), "{} should hide the cached row", excluded);
        }
    }

    #[tokio::test]
    async fn test_resolution_stays_within_concurrency_limit() {
        let config = AppConfig::default();
        let (generator, index) = slow_candidates(12, Duration::from_millis(30));

        let h = harness_with(&config, generator, index);
        tokio_test::assert_ok!(h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &[]).await);

        let peak = h.index.peak_concurrency();
        assert!(peak <= config.recommender.concurrency, "peak {} over limit", peak);
        assert!(peak > 1, "resolution ran sequentially");
        assert_eq!(h.index.calls(), 12);
    }

    #[tokio::test]
    async fn test_concurrency_is_clamped_to_candidate_limit() {
        let mut config = AppConfig::default();
        config.recommender.max_candidates = 3;
        config.recommender.concurrency = 50;
        let (generator, index) = slow_candidates(12, Duration::from_millis(30));

        let h = harness_with(&config, generator, index);
        tokio_test::assert_ok!(h.orchestrator.suggest_one(7, RelationshipFilter::Auto, &[]).await);

        assert!(h.index.peak_concurrency() <= 3);
        assert_eq!(h.index.calls(), 3);
    }

    #[tokio::test]
    async fn test_subgraph_through_orchestrator() {
        let h = harness(ScriptedGenerator::new(), FakeIndex::new());
        assert_eq!(h.orchestrator.subgraph(8).await.unwrap(), vec![8, 7]);
    }
}
