//! Bibliographic index abstraction
//!
//! Provides a unified interface for the open scholarly index used to
//! resolve and verify literature:
//! - OpenAlex (`/works` REST API, polite pool via `mailto`)
//!
//! Lookups go through a token-bucket limiter and, when configured, a Redis
//! read-through cache.

mod identifiers;
mod openalex;

pub use identifiers::{extract_doi, normalize_doi, normalize_work_id, WorkIdentifier};
pub use openalex::OpenAlexClient;

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Normalized work record as returned by the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRecord {
    /// Canonical index id, e.g. `https://openalex.org/W2741809807`
    pub id: String,
    pub title: String,
    pub year: Option<i32>,
    pub venue: Option<String>,
    /// Bare lowercase DOI (`10.xxxx/...`)
    pub doi: Option<String>,
    pub url: String,
    pub cited_by_count: i64,
    pub is_open_access: bool,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

/// Trait for bibliographic lookups
#[async_trait]
pub trait BibliographicIndex: Send + Sync {
    /// Exact lookup by DOI or index id. `Ok(None)` when the index has no such work.
    async fn lookup_by_identifier(&self, identifier: &WorkIdentifier) -> Result<Option<WorkRecord>>;

    /// Free-text search, best match first
    async fn search_by_text(&self, query: &str) -> Result<Vec<WorkRecord>>;
}
