//! Recommendation cache
//!
//! Append-only log of accepted recommendations. Reads return the most
//! recently created row for a node, narrowed to a claimed relationship
//! when the filter names one. Rows are never updated or deduplicated.

use crate::model::{Recommendation, Relationship, RelationshipFilter, ResolvedVia, ResolvedWork};
use async_trait::async_trait;
use chrono::Utc;
use litgraph_common::db::models::{RecommendationActiveModel, RecommendationRow};
use litgraph_common::db::Repository;
use litgraph_common::errors::{AppError, Result};
use sea_orm::Set;
use std::sync::RwLock;

#[async_trait]
pub trait RecommendationCache: Send + Sync {
    /// Most recently created recommendation matching the node and filter
    async fn get_latest(&self, node_id: i64, filter: RelationshipFilter) -> Result<Option<Recommendation>>;

    /// Append a recommendation
    async fn put(&self, recommendation: &Recommendation) -> Result<()>;

    /// Check the backing store is reachable
    async fn ping(&self) -> Result<()>;
}

fn to_active_model(rec: &Recommendation) -> Result<RecommendationActiveModel> {
    Ok(RecommendationActiveModel {
        id: Set(rec.id),
        node_id: Set(rec.node_id),
        canonical_id: Set(rec.work.canonical_id.clone()),
        title: Set(rec.work.title.clone()),
        year: Set(rec.work.year),
        venue: Set(rec.work.venue.clone()),
        doi: Set(rec.work.doi.clone()),
        url: Set(rec.work.url.clone()),
        cited_by_count: Set(rec.work.cited_by_count),
        is_open_access: Set(rec.work.is_open_access),
        abstract_text: Set(rec.work.abstract_text.clone()),
        resolved_via: Set(rec.work.resolved_via.as_str().to_string()),
        relationship: Set(rec.relationship.as_str().to_string()),
        requested_relationship: Set(rec.requested.as_str().to_string()),
        score: Set(rec.score),
        justification: Set(rec.justification.clone()),
        verification: Set(serde_json::to_value(&rec.verification)?),
        summary: Set(rec.summary.clone()),
        base: Set(rec.base.as_ref().map(serde_json::to_value).transpose()?),
        created_at: Set(rec.created_at.fixed_offset()),
    })
}

fn from_row(row: RecommendationRow) -> Result<Recommendation> {
    Ok(Recommendation {
        id: row.id,
        node_id: row.node_id,
        work: ResolvedWork {
            canonical_id: row.canonical_id,
            title: row.title,
            year: row.year,
            venue: row.venue,
            doi: row.doi,
            url: row.url,
            cited_by_count: row.cited_by_count,
            is_open_access: row.is_open_access,
            abstract_text: row.abstract_text,
            resolved_via: ResolvedVia::parse(&row.resolved_via),
        },
        relationship: Relationship::normalize(&row.relationship, Relationship::Similar),
        requested: RelationshipFilter::parse(Some(&row.requested_relationship)).unwrap_or_default(),
        score: row.score,
        justification: row.justification,
        verification: serde_json::from_value(row.verification)?,
        summary: row.summary,
        base: row.base.map(serde_json::from_value).transpose()?,
        created_at: row.created_at.with_timezone(&Utc),
    })
}

#[async_trait]
impl RecommendationCache for Repository {
    async fn get_latest(&self, node_id: i64, filter: RelationshipFilter) -> Result<Option<Recommendation>> {
        let relationship = filter.relationship().map(|r| r.as_str());
        self.latest_recommendation(node_id, relationship)
            .await?
            .map(from_row)
            .transpose()
    }

    async fn put(&self, recommendation: &Recommendation) -> Result<()> {
        self.insert_recommendation(to_active_model(recommendation)?).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Repository::ping(self).await
    }
}

/// Process-local recommendation log
#[derive(Default)]
pub struct InMemoryRecommendationCache {
    rows: RwLock<Vec<Recommendation>>,
}

impl InMemoryRecommendationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored row, in insertion order
    pub fn all(&self) -> Vec<Recommendation> {
        self.rows.read().map(|rows| rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RecommendationCache for InMemoryRecommendationCache {
    async fn get_latest(&self, node_id: i64, filter: RelationshipFilter) -> Result<Option<Recommendation>> {
        let rows = self.rows.read().map_err(|_| AppError::CacheError {
            message: "recommendation cache lock poisoned".to_string(),
        })?;

        // max_by_key keeps the last of equal keys, so later inserts win ties
        Ok(rows
            .iter()
            .filter(|r| r.node_id == node_id)
            .filter(|r| filter.relationship().map_or(true, |rel| r.relationship == rel))
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn put(&self, recommendation: &Recommendation) -> Result<()> {
        let mut rows = self.rows.write().map_err(|_| AppError::CacheError {
            message: "recommendation cache lock poisoned".to_string(),
        })?;
        rows.push(recommendation.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
