//! Literature suggestion handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use litgraph_common::errors::{AppError, Result};
use litgraph_recommender::{BaseRef, Recommendation, RelationshipFilter};

/// Request for a suggestion driven by the node's own context
#[derive(Debug, Default, Deserialize, Validate)]
pub struct SuggestRequest {
    /// `auto` or one of the relationship spellings
    #[serde(default)]
    pub relationship: Option<String>,

    /// Canonical ids the caller has already seen
    #[serde(default)]
    #[validate(length(max = 100))]
    pub exclude_ids: Vec<String>,

    /// Skip the cached read and always run the pipeline
    #[serde(default)]
    pub refresh: bool,
}

/// Request for a suggestion anchored to a base paper
#[derive(Debug, Deserialize, Validate)]
pub struct SuggestFromBaseRequest {
    /// Index id or URL, DOI, doi.org link or title
    #[validate(length(min = 1, max = 2000))]
    pub base: String,

    #[serde(default)]
    pub relationship: Option<String>,

    #[serde(default)]
    #[validate(length(max = 100))]
    pub exclude_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LatestQuery {
    pub relationship: Option<String>,
}

/// Suggestion as rendered to clients
#[derive(Debug, Serialize)]
pub struct SuggestionCard {
    /// Canonical work id, usable in a later `exclude_ids`
    pub id: String,
    /// Row id in the recommendation log
    pub recommendation_id: Uuid,
    pub title: String,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub doi: Option<String>,
    pub url: String,
    pub relationship: &'static str,
    pub confidence: f64,
    pub verified: bool,
    pub summary: String,
    pub why_relevant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<BaseRef>,
    pub created_at: DateTime<Utc>,
    pub cached: bool,
}

impl SuggestionCard {
    fn new(rec: Recommendation, cached: bool) -> Self {
        let confidence = rec.confidence();
        Self {
            id: rec.work.canonical_id,
            recommendation_id: rec.id,
            confidence,
            relationship: rec.relationship.as_str(),
            verified: rec.verification.ok,
            title: rec.work.title,
            year: rec.work.year,
            venue: rec.work.venue,
            doi: rec.work.doi,
            url: rec.work.url,
            summary: rec.summary,
            why_relevant: rec.justification,
            base: rec.base,
            created_at: rec.created_at,
            cached,
        }
    }
}

fn validate(request: &impl Validate) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })
}

/// Latest cached suggestion for the filter, or a fresh one
pub async fn suggest(
    State(state): State<AppState>,
    Path(node_id): Path<i64>,
    Json(request): Json<SuggestRequest>,
) -> Result<Json<SuggestionCard>> {
    validate(&request)?;
    let filter = RelationshipFilter::parse(request.relationship.as_deref())?;

    if !request.refresh {
        let cached = state
            .orchestrator
            .get_cached_excluding(node_id, filter, &request.exclude_ids)
            .await?;
        if let Some(cached) = cached {
            tracing::debug!(node_id = node_id, id = %cached.id, "Serving cached suggestion");
            return Ok(Json(SuggestionCard::new(cached, true)));
        }
    }

    let rec = state
        .orchestrator
        .suggest_one(node_id, filter, &request.exclude_ids)
        .await?;

    tracing::info!(
        node_id = node_id,
        work = %rec.work.canonical_id,
        relationship = %rec.relationship,
        "Suggestion created"
    );

    Ok(Json(SuggestionCard::new(rec, false)))
}

/// Fresh suggestion anchored to a base paper
pub async fn suggest_from_base(
    State(state): State<AppState>,
    Path(node_id): Path<i64>,
    Json(request): Json<SuggestFromBaseRequest>,
) -> Result<Json<SuggestionCard>> {
    validate(&request)?;
    let filter = RelationshipFilter::parse(request.relationship.as_deref())?;

    let rec = state
        .orchestrator
        .suggest_one_from_base(node_id, &request.base, filter, &request.exclude_ids)
        .await?;

    tracing::info!(
        node_id = node_id,
        work = %rec.work.canonical_id,
        base = rec.base.as_ref().map(|b| b.canonical_id.as_str()).unwrap_or_default(),
        "Anchored suggestion created"
    );

    Ok(Json(SuggestionCard::new(rec, false)))
}

/// Latest cached suggestion, 404 when none exists
pub async fn latest(
    State(state): State<AppState>,
    Path(node_id): Path<i64>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<SuggestionCard>> {
    let filter = RelationshipFilter::parse(query.relationship.as_deref())?;

    let cached = state
        .orchestrator
        .get_cached(node_id, filter)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource_type: "recommendation".to_string(),
            id: node_id.to_string(),
        })?;

    Ok(Json(SuggestionCard::new(cached, true)))
}
