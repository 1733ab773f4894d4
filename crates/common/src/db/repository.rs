//! Repository pattern for database operations
//!
//! Provides a clean interface for the experiment graph and the
//! append-only recommendation log.

use crate::errors::Result;
use crate::db::DbPool;
use crate::db::models::*;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use std::collections::HashMap;

/// Parent id -> child ids, in edge insertion order
pub type Adjacency = HashMap<i64, Vec<i64>>;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Experiment Graph
    // ========================================================================

    /// Find experiment by ID
    pub async fn find_experiment(&self, id: i64) -> Result<Option<Experiment>> {
        ExperimentEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Experiments with an edge pointing at `id`, with the edge itself
    pub async fn parents_of(&self, id: i64) -> Result<Vec<(ExperimentRelationship, Experiment)>> {
        let edges = RelationshipEntity::find()
            .filter(RelationshipColumn::ToExperimentId.eq(id))
            .order_by_asc(RelationshipColumn::Id)
            .all(self.read_conn())
            .await?;

        self.attach_endpoints(edges, |edge| edge.from_experiment_id).await
    }

    /// Experiments `id` points at, with the edge itself
    pub async fn children_of(&self, id: i64) -> Result<Vec<(ExperimentRelationship, Experiment)>> {
        let edges = RelationshipEntity::find()
            .filter(RelationshipColumn::FromExperimentId.eq(id))
            .order_by_asc(RelationshipColumn::Id)
            .all(self.read_conn())
            .await?;

        self.attach_endpoints(edges, |edge| edge.to_experiment_id).await
    }

    /// Pair each edge with the experiment on its far side, keeping edge order.
    /// Edges whose endpoint row is gone are skipped.
    async fn attach_endpoints(
        &self,
        edges: Vec<ExperimentRelationship>,
        endpoint: impl Fn(&ExperimentRelationship) -> i64,
    ) -> Result<Vec<(ExperimentRelationship, Experiment)>> {
        if edges.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = edges.iter().map(&endpoint).collect();
        let experiments: HashMap<i64, Experiment> = ExperimentEntity::find()
            .filter(ExperimentColumn::Id.is_in(ids))
            .all(self.read_conn())
            .await?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();

        Ok(edges
            .into_iter()
            .filter_map(|edge| {
                let node = experiments.get(&endpoint(&edge))?.clone();
                Some((edge, node))
            })
            .collect())
    }

    /// Load every edge as an adjacency map
    pub async fn load_adjacency(&self) -> Result<Adjacency> {
        let edges: Vec<(i64, i64)> = RelationshipEntity::find()
            .select_only()
            .column(RelationshipColumn::FromExperimentId)
            .column(RelationshipColumn::ToExperimentId)
            .order_by_asc(RelationshipColumn::Id)
            .into_tuple()
            .all(self.read_conn())
            .await?;

        let mut adjacency = Adjacency::new();
        for (from, to) in edges {
            adjacency.entry(from).or_default().push(to);
        }
        Ok(adjacency)
    }

    // ========================================================================
    // Recommendations
    // ========================================================================

    /// Append a recommendation row
    pub async fn insert_recommendation(&self, row: RecommendationActiveModel) -> Result<RecommendationRow> {
        row.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Most recently created recommendation for a node, optionally narrowed
    /// to a claimed relationship
    pub async fn latest_recommendation(
        &self,
        node_id: i64,
        relationship: Option<&str>,
    ) -> Result<Option<RecommendationRow>> {
        let mut query = RecommendationEntity::find()
            .filter(RecommendationColumn::NodeId.eq(node_id));

        if let Some(relationship) = relationship {
            query = query.filter(RecommendationColumn::Relationship.eq(relationship));
        }

        query
            .order_by_desc(RecommendationColumn::CreatedAt)
            .order_by_desc(RecommendationColumn::Id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }
}
