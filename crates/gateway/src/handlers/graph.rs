//! Experiment graph handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::AppState;
use litgraph_common::errors::Result;

#[derive(Debug, Serialize)]
pub struct SubgraphResponse {
    pub node_id: i64,
    /// The node first, then every descendant
    pub nodes: Vec<i64>,
}

/// Ids a cascading delete of `node_id` would remove
pub async fn subgraph(
    State(state): State<AppState>,
    Path(node_id): Path<i64>,
) -> Result<Json<SubgraphResponse>> {
    let nodes = state.orchestrator.subgraph(node_id).await?;
    tracing::debug!(node_id = node_id, size = nodes.len(), "Subgraph collected");

    Ok(Json(SubgraphResponse { node_id, nodes }))
}
