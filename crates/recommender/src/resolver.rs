//! Work resolution and verification
//!
//! Matches untrusted candidates against the bibliographic index. Lookups
//! try the exact identifier first and fall back to the top text-search hit.
//! Index failures and timeouts are absorbed: the candidate is unresolved.

use crate::model::{ResolvedVia, ResolvedWork, VerificationResult};
use litgraph_common::bibliography::{
    extract_doi, normalize_work_id, BibliographicIndex, WorkIdentifier, WorkRecord,
};
use litgraph_common::errors::{AppError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Caller-supplied base paper reference.
///
/// Accepts an index id or URL, a bare DOI, a `doi.org` link, or a title.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseReference {
    pub index_id: Option<String>,
    pub doi: Option<String>,
    pub text: String,
}

impl BaseReference {
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim().to_string();
        Self {
            index_id: normalize_work_id(&text),
            doi: extract_doi(&text),
            text,
        }
    }
}

/// Resolver over a bibliographic index
#[derive(Clone)]
pub struct Resolver {
    index: Arc<dyn BibliographicIndex>,
    timeout: Duration,
}

impl Resolver {
    pub fn new(index: Arc<dyn BibliographicIndex>, timeout: Duration) -> Self {
        Self { index, timeout }
    }

    /// Run an index call under the resolver timeout, absorbing failures
    async fn guarded<T, F>(&self, operation: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                let degraded = AppError::ExternalServiceDegraded {
                    service: "bibliography".to_string(),
                    message: e.to_string(),
                };
                warn!(operation = operation, error = %degraded, "Index call failed, treating as unresolved");
                None
            }
            Err(_) => {
                let timed_out = AppError::Timeout {
                    service: "bibliography".to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                };
                warn!(operation = operation, error = %timed_out, "Index call timed out, treating as unresolved");
                None
            }
        }
    }

    async fn lookup(&self, identifier: &WorkIdentifier) -> Option<WorkRecord> {
        self.guarded("lookup", self.index.lookup_by_identifier(identifier))
            .await
            .flatten()
    }

    async fn search_top(&self, query: &str) -> Option<WorkRecord> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        self.guarded("search", self.index.search_by_text(query))
            .await
            .and_then(|hits| hits.into_iter().next())
    }

    /// Resolve a candidate: identifier lookup first, then the top text-search hit
    pub async fn resolve(&self, identifier_hint: Option<&str>, text_hint: &str) -> Option<ResolvedWork> {
        if let Some(identifier) = identifier_hint.and_then(WorkIdentifier::parse) {
            if let Some(record) = self.lookup(&identifier).await {
                return Some(ResolvedWork::from_record(record, ResolvedVia::Identifier));
            }
            debug!(identifier = %identifier, "Identifier unresolved, trying text search");
        }

        self.search_top(text_hint)
            .await
            .map(|record| ResolvedWork::from_record(record, ResolvedVia::TitleSearch))
    }

    /// Resolve a base reference: index id, then DOI from the link, then title search
    pub async fn resolve_base(&self, reference: &BaseReference) -> Option<ResolvedWork> {
        if let Some(id) = &reference.index_id {
            if let Some(record) = self.lookup(&WorkIdentifier::IndexId(id.clone())).await {
                return Some(ResolvedWork::from_record(record, ResolvedVia::Identifier));
            }
        }

        if let Some(doi) = &reference.doi {
            if let Some(record) = self.lookup(&WorkIdentifier::Doi(doi.clone())).await {
                return Some(ResolvedWork::from_record(record, ResolvedVia::Identifier));
            }
        }

        self.search_top(&reference.text)
            .await
            .map(|record| ResolvedWork::from_record(record, ResolvedVia::TitleSearch))
    }

    /// Binary existence check: a resolved work carrying a canonical id is real
    pub fn verify(&self, work: Option<&ResolvedWork>) -> VerificationResult {
        let Some(work) = work.filter(|w| !w.canonical_id.trim().is_empty()) else {
            return VerificationResult::failed("unresolved");
        };

        let mut evidence = serde_json::Map::new();
        evidence.insert("canonical_id".to_string(), work.canonical_id.clone().into());
        evidence.insert(
            "doi".to_string(),
            work.doi.clone().map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
        );
        evidence.insert("resolved_via".to_string(), work.resolved_via.as_str().into());

        VerificationResult {
            ok: true,
            strength: 1.0,
            evidence,
        }
    }
}
