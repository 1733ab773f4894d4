//! Context assembly
//!
//! Builds the compact research context of a node from the graph store's
//! public queries: the node itself, its parents and children with the
//! relationship label of each edge, and the typed node extensions.

use crate::model::{NodeExtensions, ResearchContext};
use async_trait::async_trait;
use litgraph_common::db::models::Experiment;
use litgraph_common::db::{Adjacency, Repository};
use litgraph_common::errors::{AppError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Neighbouring node together with the label of the connecting edge
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedNode {
    pub node: Experiment,
    pub relationship: String,
}

/// Read access to the experiment graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get_node(&self, id: i64) -> Result<Option<Experiment>>;

    /// Nodes with an edge into `id`, in edge order
    async fn get_parents(&self, id: i64) -> Result<Vec<LinkedNode>>;

    /// Nodes `id` has an edge into, in edge order
    async fn get_children(&self, id: i64) -> Result<Vec<LinkedNode>>;

    /// Every edge as parent -> children
    async fn adjacency(&self) -> Result<Adjacency>;
}

#[async_trait]
impl GraphStore for Repository {
    async fn get_node(&self, id: i64) -> Result<Option<Experiment>> {
        self.find_experiment(id).await
    }

    async fn get_parents(&self, id: i64) -> Result<Vec<LinkedNode>> {
        Ok(self
            .parents_of(id)
            .await?
            .into_iter()
            .map(|(edge, node)| LinkedNode { node, relationship: edge.relationship_type })
            .collect())
    }

    async fn get_children(&self, id: i64) -> Result<Vec<LinkedNode>> {
        Ok(self
            .children_of(id)
            .await?
            .into_iter()
            .map(|(edge, node)| LinkedNode { node, relationship: edge.relationship_type })
            .collect())
    }

    async fn adjacency(&self) -> Result<Adjacency> {
        self.load_adjacency().await
    }
}

fn brief(linked: &[LinkedNode]) -> Vec<String> {
    linked
        .iter()
        .map(|l| {
            let rel = l.relationship.trim();
            if rel.is_empty() {
                l.node.title.clone()
            } else {
                format!("{} ({})", l.node.title, rel)
            }
        })
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn vocabulary(items: &[String]) -> BTreeSet<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Assembles `ResearchContext` records
#[derive(Clone)]
pub struct ContextAssembler {
    store: Arc<dyn GraphStore>,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Build the context of `node_id`. Fails with `NodeNotFound`.
    #[instrument(skip(self))]
    pub async fn assemble(&self, node_id: i64) -> Result<ResearchContext> {
        let node = self
            .store
            .get_node(node_id)
            .await?
            .ok_or(AppError::NodeNotFound { id: node_id })?;

        let parents = self.store.get_parents(node_id).await?;
        let children = self.store.get_children(node_id).await?;
        let extensions = NodeExtensions::from_json(node.extra_data.as_ref());

        let context = ResearchContext {
            node_id,
            problem: node.title.trim().to_string(),
            description: non_empty(&node.description),
            motivation: non_empty(&node.motivation),
            expectations: non_empty(&node.expectations),
            hypothesis: non_empty(&node.hypothesis),
            parents_brief: brief(&parents),
            children_brief: brief(&children),
            method_aliases: vocabulary(&extensions.method_aliases),
            dataset_metrics: vocabulary(&extensions.dataset_metrics),
        };

        debug!(
            parents = context.parents_brief.len(),
            children = context.children_brief.len(),
            methods = context.method_aliases.len(),
            "Context built"
        );

        Ok(context)
    }
}
