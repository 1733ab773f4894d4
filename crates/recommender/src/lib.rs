//! litgraph Literature Recommender
//!
//! Turns an experiment node's research context into one verified, scored,
//! relationship-typed literature suggestion:
//! - Context assembly over the experiment graph
//! - Candidate proposal through the generative service
//! - Resolution and verification against the bibliographic index
//! - Ranking, summarization and the append-only recommendation log

pub mod cache;
pub mod context;
pub mod graph;
pub mod model;
pub mod orchestrator;
pub mod proposer;
pub mod resolver;
pub mod scorer;
pub mod summary;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{InMemoryRecommendationCache, RecommendationCache};
pub use context::{ContextAssembler, GraphStore};
pub use model::{
    BaseRef, Candidate, NodeExtensions, Recommendation, Relationship, RelationshipFilter,
    ResearchContext, ResolvedWork, ScoredCandidate, VerificationResult,
};
pub use orchestrator::{Orchestrator, PipelineState};
pub use summary::Summarizer;
