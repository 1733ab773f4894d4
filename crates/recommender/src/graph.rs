//! Subgraph collection over the experiment graph
//!
//! Worklist traversal over an explicit adjacency map. Used to find every
//! descendant of a node, e.g. before a cascading delete.

use crate::context::GraphStore;
use litgraph_common::db::Adjacency;
use litgraph_common::errors::{AppError, Result};
use std::collections::{HashSet, VecDeque};

/// Nodes reachable from `root`, root first, in breadth-first discovery order.
/// Each node appears once; cycles terminate.
pub fn collect_subgraph(root: i64, adjacency: &Adjacency) -> Vec<i64> {
    let mut visited = HashSet::from([root]);
    let mut order = vec![root];
    let mut worklist = VecDeque::from([root]);

    while let Some(current) = worklist.pop_front() {
        let Some(children) = adjacency.get(&current) else {
            continue;
        };

        for &child in children {
            if visited.insert(child) {
                order.push(child);
                worklist.push_back(child);
            }
        }
    }

    order
}

/// Load adjacency from the store and collect the subgraph under `root`
pub async fn subgraph(store: &dyn GraphStore, root: i64) -> Result<Vec<i64>> {
    if store.get_node(root).await?.is_none() {
        return Err(AppError::NodeNotFound { id: root });
    }

    let adjacency = store.adjacency().await?;
    let nodes = collect_subgraph(root, &adjacency);
    tracing::debug!(root = root, nodes = nodes.len(), "Collected subgraph");
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryGraph;

    fn adjacency(edges: &[(i64, i64)]) -> Adjacency {
        let mut adj = Adjacency::new();
        for &(from, to) in edges {
            adj.entry(from).or_default().push(to);
        }
        adj
    }

    #[test]
    fn test_collects_descendants_breadth_first() {
        let adj = adjacency(&[(1, 2), (1, 3), (2, 4), (3, 5), (9, 1)]);
        assert_eq!(collect_subgraph(1, &adj), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_leaf_is_its_own_subgraph() {
        let adj = adjacency(&[(1, 2)]);
        assert_eq!(collect_subgraph(2, &adj), vec![2]);
        assert_eq!(collect_subgraph(42, &Adjacency::new()), vec![42]);
    }

    #[test]
    fn test_terminates_on_cycles() {
        let adj = adjacency(&[(1, 2), (2, 3), (3, 1), (3, 3)]);
        assert_eq!(collect_subgraph(1, &adj), vec![1, 2, 3]);
    }

    #[test]
    fn test_diamond_visits_shared_child_once() {
        let adj = adjacency(&[(1, 2), (1, 3), (2, 4), (3, 4)]);
        assert_eq!(collect_subgraph(1, &adj), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let edges: Vec<(i64, i64)> = (0..100_000).map(|i| (i, i + 1)).collect();
        let adj = adjacency(&edges);
        assert_eq!(collect_subgraph(0, &adj).len(), 100_001);
    }

    #[tokio::test]
    async fn test_subgraph_through_store() {
        let graph = InMemoryGraph::new();
        graph.add_node(1, "root");
        graph.add_node(2, "child");
        graph.add_node(3, "grandchild");
        graph.add_edge(1, 2, "leads_to");
        graph.add_edge(2, 3, "supports");

        assert_eq!(subgraph(&graph, 2).await.unwrap(), vec![2, 3]);
        assert!(matches!(
            subgraph(&graph, 77).await,
            Err(AppError::NodeNotFound { id: 77 })
        ));
    }
}
