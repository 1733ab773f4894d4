//! OpenAlex client

use super::{normalize_doi, BibliographicIndex, WorkIdentifier, WorkRecord};
use crate::cache::{keys, Cache};
use crate::config::BibliographyConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// OpenAlex works API client
pub struct OpenAlexClient {
    client: reqwest::Client,
    base_url: String,
    mailto: String,
    page_size: u32,
    timeout: Duration,
    limiter: DefaultDirectRateLimiter,
    cache: Option<Arc<Cache>>,
}

#[derive(Deserialize)]
struct RawWork {
    id: String,
    display_name: Option<String>,
    title: Option<String>,
    publication_year: Option<i32>,
    doi: Option<String>,
    ids: Option<RawIds>,
    primary_location: Option<RawLocation>,
    host_venue: Option<RawHostVenue>,
    cited_by_count: Option<i64>,
    open_access: Option<RawOpenAccess>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
}

#[derive(Deserialize)]
struct RawIds {
    doi: Option<String>,
}

#[derive(Deserialize)]
struct RawLocation {
    landing_page_url: Option<String>,
    source: Option<RawSource>,
}

#[derive(Deserialize)]
struct RawSource {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct RawHostVenue {
    display_name: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct RawOpenAccess {
    is_oa: Option<bool>,
}

#[derive(Deserialize)]
struct RawSearchPage {
    #[serde(default)]
    results: Vec<RawWork>,
}

/// Rebuild an abstract from OpenAlex's inverted index. Positions come from
/// the response, so the words are ordered by sorting rather than by slot.
fn flatten_abstract(index: &HashMap<String, Vec<usize>>) -> String {
    let mut words: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(token, positions)| positions.iter().map(move |&pos| (pos, token.as_str())))
        .collect();

    words.sort_unstable();
    words.dedup_by_key(|(pos, _)| *pos);

    words
        .into_iter()
        .map(|(_, token)| token)
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl RawWork {
    fn normalize(self) -> WorkRecord {
        let doi = self
            .doi
            .or_else(|| self.ids.and_then(|ids| ids.doi))
            .map(|d| normalize_doi(&d))
            .filter(|d| !d.is_empty());

        let (landing_page, primary_venue) = match self.primary_location {
            Some(loc) => (
                loc.landing_page_url,
                loc.source.and_then(|s| s.display_name),
            ),
            None => (None, None),
        };
        let (host_name, host_url) = match self.host_venue {
            Some(host) => (host.display_name, host.url),
            None => (None, None),
        };

        let url = landing_page
            .or(host_url)
            .or_else(|| doi.as_ref().map(|d| format!("https://doi.org/{}", d)))
            .unwrap_or_else(|| self.id.clone());

        WorkRecord {
            title: self
                .display_name
                .or(self.title)
                .unwrap_or_default(),
            year: self.publication_year,
            venue: primary_venue.or(host_name),
            doi,
            url,
            cited_by_count: self.cited_by_count.unwrap_or(0),
            is_open_access: self.open_access.and_then(|oa| oa.is_oa).unwrap_or(false),
            abstract_text: self
                .abstract_inverted_index
                .as_ref()
                .map(flatten_abstract)
                .unwrap_or_default(),
            id: self.id,
        }
    }
}

impl OpenAlexClient {
    /// Create a new client from configuration
    pub fn new(config: &BibliographyConfig, cache: Option<Arc<Cache>>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("litgraph/{} (mailto:{})", crate::VERSION, config.mailto))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let rps = NonZeroU32::new(config.requests_per_second).ok_or_else(|| AppError::Configuration {
            message: "bibliography.requests_per_second must be positive".to_string(),
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            mailto: config.mailto.clone(),
            page_size: config.search_page_size.max(1),
            timeout,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
            cache,
        })
    }

    /// GET a works endpoint. 404 maps to `Ok(None)`.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        operation: &str,
    ) -> Result<Option<T>> {
        self.limiter.until_ready().await;

        let start = Instant::now();
        let url = format!("{}{}", self.base_url, path);
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("mailto", self.mailto.clone()));

        let result = self.send::<T>(&url, &query).await;
        metrics::record_external(
            start.elapsed().as_secs_f64(),
            "bibliography",
            operation,
            result.is_ok(),
        );
        result
    }

    async fn send<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<Option<T>> {
        let response = self.client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout {
                        service: "bibliography".to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    AppError::Bibliographic {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Bibliographic {
                message: format!("API error {}: {}", status, body),
            });
        }

        let parsed = response.json::<T>().await.map_err(|e| AppError::Bibliographic {
            message: format!("Failed to parse response: {}", e),
        })?;

        Ok(Some(parsed))
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.cache.as_ref()?;
        match cache.get::<T>(key).await {
            Ok(hit) => {
                metrics::record_cache(hit.is_some(), "bibliography");
                hit
            }
            Err(e) => {
                warn!(error = %e, "Bibliography cache read failed, querying index");
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(key, value).await {
                warn!(error = %e, "Failed to cache bibliography result, continuing without cache");
            }
        }
    }
}

#[async_trait]
impl BibliographicIndex for OpenAlexClient {
    async fn lookup_by_identifier(&self, identifier: &WorkIdentifier) -> Result<Option<WorkRecord>> {
        let key = keys::work_by_identifier(&identifier.to_string());
        if let Some(hit) = self.cached::<WorkRecord>(&key).await {
            return Ok(Some(hit));
        }

        let path = match identifier {
            WorkIdentifier::Doi(doi) => format!("/works/doi:{}", doi),
            WorkIdentifier::IndexId(id) => format!("/works/{}", id),
        };

        let work = self
            .get::<RawWork>(&path, &[], "lookup")
            .await?
            .map(RawWork::normalize);

        match &work {
            Some(found) => {
                debug!(identifier = %identifier, id = %found.id, "Resolved work by identifier");
                self.store(&key, found).await;
            }
            None => debug!(identifier = %identifier, "Identifier not found in index"),
        }

        Ok(work)
    }

    async fn search_by_text(&self, query: &str) -> Result<Vec<WorkRecord>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let key = keys::work_search(query, self.page_size);
        if let Some(hit) = self.cached::<Vec<WorkRecord>>(&key).await {
            return Ok(hit);
        }

        let params = [
            ("search", query.to_string()),
            ("per-page", self.page_size.to_string()),
        ];
        let works: Vec<WorkRecord> = self
            .get::<RawSearchPage>("/works", &params, "search")
            .await?
            .map(|page| page.results.into_iter().map(RawWork::normalize).collect())
            .unwrap_or_default();

        debug!(query = %query, hits = works.len(), "Index search completed");
        if !works.is_empty() {
            self.store(&key, &works).await;
        }

        Ok(works)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": "https://openalex.org/W2741809807",
        "display_name": "Deep learning",
        "publication_year": 2015,
        "doi": "https://doi.org/10.1038/NATURE14539",
        "primary_location": {
            "landing_page_url": "https://www.nature.com/articles/nature14539",
            "source": { "display_name": "Nature" }
        },
        "cited_by_count": 50000,
        "open_access": { "is_oa": true },
        "abstract_inverted_index": { "Deep": [0], "learning": [1, 4], "allows": [2], "models": [3] }
    }"#;

    #[test]
    fn test_normalize_full_record() {
        let raw: RawWork = serde_json::from_str(SAMPLE).unwrap();
        let work = raw.normalize();

        assert_eq!(work.id, "https://openalex.org/W2741809807");
        assert_eq!(work.title, "Deep learning");
        assert_eq!(work.year, Some(2015));
        assert_eq!(work.venue.as_deref(), Some("Nature"));
        assert_eq!(work.doi.as_deref(), Some("10.1038/nature14539"));
        assert_eq!(work.url, "https://www.nature.com/articles/nature14539");
        assert!(work.is_open_access);
        assert_eq!(work.abstract_text, "Deep learning allows models learning");
    }

    #[test]
    fn test_normalize_sparse_record_with_nulls() {
        let raw: RawWork = serde_json::from_str(
            r#"{
                "id": "https://openalex.org/W1",
                "display_name": null,
                "title": "Legacy title",
                "publication_year": null,
                "ids": { "doi": "https://doi.org/10.1/x" },
                "host_venue": { "display_name": "Old Venue", "url": null },
                "cited_by_count": null,
                "open_access": null,
                "abstract_inverted_index": null
            }"#,
        )
        .unwrap();
        let work = raw.normalize();

        assert_eq!(work.title, "Legacy title");
        assert_eq!(work.year, None);
        assert_eq!(work.venue.as_deref(), Some("Old Venue"));
        assert_eq!(work.url, "https://doi.org/10.1/x");
        assert_eq!(work.cited_by_count, 0);
        assert!(!work.is_open_access);
        assert!(work.abstract_text.is_empty());
    }

    #[test]
    fn test_flatten_abstract_empty_index() {
        assert_eq!(flatten_abstract(&HashMap::new()), "");
    }

    #[test]
    fn test_flatten_abstract_tolerates_huge_positions() {
        let index: HashMap<String, Vec<usize>> = HashMap::from([
            ("tail".to_string(), vec![usize::MAX]),
            ("head".to_string(), vec![0]),
            ("middle".to_string(), vec![u32::MAX as usize]),
        ]);
        assert_eq!(flatten_abstract(&index), "head middle tail");
    }

    #[test]
    fn test_flatten_abstract_keeps_one_word_per_position() {
        let index: HashMap<String, Vec<usize>> = HashMap::from([
            ("b".to_string(), vec![1]),
            ("a".to_string(), vec![0, 1]),
        ]);
        assert_eq!(flatten_abstract(&index), "a a");
    }

    #[test]
    fn test_search_page_defaults() {
        let page: RawSearchPage = serde_json::from_str(r#"{"meta": {"count": 0}}"#).unwrap();
        assert!(page.results.is_empty());
    }

    #[test]
    fn test_client_rejects_zero_rate() {
        let config = BibliographyConfig {
            requests_per_second: 0,
            ..BibliographyConfig::default()
        };
        assert!(OpenAlexClient::new(&config, None).is_err());
    }
}
