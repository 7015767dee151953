use std::collections::{BTreeMap, HashSet};

use crate::error::Result;
use crate::index::GraphIndex;
use crate::models::{CycleDetection, NodeId, Relationship, Traversal, TraversalLimits};
use crate::store::{EdgeStore, NodeDirectory};

struct Frame {
    node: NodeId,
    edges: Vec<Relationship>,
    next: usize,
}

/// Depth-first search over outgoing edges, reporting the first cycle
/// reachable from `start` in edge-insertion order. Finding a cycle is the
/// successful answer to the query, never an error.
pub async fn detect_cycle<S, N>(
    index: &GraphIndex<'_, S>,
    nodes: &N,
    start: NodeId,
    limits: TraversalLimits,
) -> Result<CycleDetection>
where
    S: EdgeStore + ?Sized,
    N: NodeDirectory + ?Sized,
{
    let mut visited: HashSet<NodeId> = HashSet::from([start]);
    let mut on_stack: HashSet<NodeId> = HashSet::from([start]);
    let mut path: Vec<NodeId> = vec![start];
    let mut stack: Vec<Frame> = vec![Frame {
        node: start,
        edges: index.outgoing(start).await?,
        next: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        if frame.next >= frame.edges.len() {
            on_stack.remove(&frame.node);
            path.pop();
            stack.pop();
            continue;
        }

        let edge = frame.edges[frame.next].clone();
        frame.next += 1;
        let neighbor = edge.target_id;

        if on_stack.contains(&neighbor) {
            // Close the loop: everything from the re-entered node onward,
            // plus the re-entered node again.
            let position = path.iter().position(|node| *node == neighbor).unwrap_or(0);
            let mut cycle = path[position..].to_vec();
            cycle.push(neighbor);
            return Ok(CycleDetection::with_cycle(cycle));
        }

        if visited.contains(&neighbor) {
            continue;
        }

        if !nodes.node_exists(neighbor).await? {
            tracing::warn!(
                relationship = %edge.id,
                node = %neighbor,
                "skipping edge to missing node during cycle detection"
            );
            continue;
        }

        if visited.len() >= limits.max_nodes {
            tracing::warn!(
                limit = limits.max_nodes,
                "cycle detection node ceiling reached, reporting best-effort result"
            );
            return Ok(CycleDetection::no_cycle());
        }

        visited.insert(neighbor);
        on_stack.insert(neighbor);
        path.push(neighbor);
        let edges = index.outgoing(neighbor).await?;
        stack.push(Frame {
            node: neighbor,
            edges,
            next: 0,
        });
    }

    Ok(CycleDetection::no_cycle())
}

/// Breadth-first search outward from `start`, grouping discovered nodes by
/// level up to `max_depth`. Each node lands on its shallowest reachable
/// level; an edge is recorded exactly when it first discovers its target.
pub async fn traverse<S, N>(
    index: &GraphIndex<'_, S>,
    nodes: &N,
    start: NodeId,
    max_depth: u32,
    limits: TraversalLimits,
) -> Result<Traversal>
where
    S: EdgeStore + ?Sized,
    N: NodeDirectory + ?Sized,
{
    let mut visited: HashSet<NodeId> = HashSet::from([start]);
    let mut nodes_by_level: BTreeMap<u32, Vec<NodeId>> = BTreeMap::from([(0, vec![start])]);
    let mut relationships: Vec<Relationship> = Vec::new();
    let mut frontier: Vec<NodeId> = vec![start];
    let mut depth = 0u32;
    let mut truncated = false;

    while depth < max_depth && !truncated {
        let mut discovered: Vec<NodeId> = Vec::new();

        'expand: for node in &frontier {
            for edge in index.outgoing(*node).await? {
                let target = edge.target_id;
                if visited.contains(&target) {
                    continue;
                }
                if !nodes.node_exists(target).await? {
                    tracing::warn!(
                        relationship = %edge.id,
                        node = %target,
                        "skipping edge to missing node during traversal"
                    );
                    continue;
                }
                if visited.len() >= limits.max_nodes {
                    tracing::warn!(
                        limit = limits.max_nodes,
                        "traversal node ceiling reached, result truncated"
                    );
                    truncated = true;
                    break 'expand;
                }

                visited.insert(target);
                discovered.push(target);
                relationships.push(edge);
            }
        }

        if discovered.is_empty() {
            break;
        }
        depth += 1;
        nodes_by_level.insert(depth, discovered.clone());
        frontier = discovered;
    }

    Ok(Traversal::new(start, nodes_by_level, relationships))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::{
        CreateRelationshipPayload, Relationship, RelationshipDirection, RelationshipStrength,
        RelationshipType,
    };
    use crate::store::memory::{MemoryEdgeStore, MemoryNodeDirectory};

    struct Fixture {
        store: MemoryEdgeStore,
        nodes: MemoryNodeDirectory,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryEdgeStore::new(),
                nodes: MemoryNodeDirectory::new(),
            }
        }

        async fn node(&self, label: &str) -> NodeId {
            let id = NodeId(Uuid::new_v4());
            self.nodes.add_node(id, label).await;
            id
        }

        async fn link(&self, source: NodeId, target: NodeId) {
            let draft = CreateRelationshipPayload {
                source_id: source,
                target_id: target,
                relationship_type: RelationshipType::Dependency,
                direction: RelationshipDirection::Unidirectional,
                strength: RelationshipStrength::Strong,
                description: None,
            }
            .normalize()
            .expect("draft should normalize");
            self.store
                .insert(&Relationship::create(draft, Utc::now().naive_utc()))
                .await
                .expect("insert should succeed");
        }
    }

    #[tokio::test]
    async fn detects_three_node_cycle_with_path() {
        let fx = Fixture::new();
        let a = fx.node("A").await;
        let b = fx.node("B").await;
        let c = fx.node("C").await;
        fx.link(a, b).await;
        fx.link(b, c).await;
        fx.link(c, a).await;

        let index = GraphIndex::new(&fx.store);
        let result = detect_cycle(&index, &fx.nodes, a, TraversalLimits::default())
            .await
            .expect("detection should succeed");

        assert!(result.has_cycle);
        assert_eq!(result.cycle_path, vec![a, b, c, a]);
    }

    #[tokio::test]
    async fn acyclic_chain_reports_no_cycle() {
        let fx = Fixture::new();
        let a = fx.node("A").await;
        let b = fx.node("B").await;
        let c = fx.node("C").await;
        fx.link(a, b).await;
        fx.link(b, c).await;

        let index = GraphIndex::new(&fx.store);
        let result = detect_cycle(&index, &fx.nodes, a, TraversalLimits::default())
            .await
            .expect("detection should succeed");

        assert!(!result.has_cycle);
        assert!(result.cycle_path.is_empty());
    }

    #[tokio::test]
    async fn cycle_not_involving_start_is_still_found_downstream() {
        let fx = Fixture::new();
        let a = fx.node("A").await;
        let b = fx.node("B").await;
        let c = fx.node("C").await;
        fx.link(a, b).await;
        fx.link(b, c).await;
        fx.link(c, b).await;

        let index = GraphIndex::new(&fx.store);
        let result = detect_cycle(&index, &fx.nodes, a, TraversalLimits::default())
            .await
            .expect("detection should succeed");

        assert!(result.has_cycle);
        assert_eq!(result.cycle_path, vec![b, c, b]);
    }

    #[tokio::test]
    async fn diamond_assigns_shared_node_to_shallowest_level() {
        let fx = Fixture::new();
        let a = fx.node("A").await;
        let b = fx.node("B").await;
        let c = fx.node("C").await;
        let d = fx.node("D").await;
        fx.link(a, b).await;
        fx.link(a, c).await;
        fx.link(b, d).await;
        fx.link(c, d).await;

        let index = GraphIndex::new(&fx.store);
        let result = traverse(&index, &fx.nodes, a, 10, TraversalLimits::default())
            .await
            .expect("traversal should succeed");

        assert_eq!(result.total_nodes, 4);
        assert_eq!(result.nodes_by_level[&0], vec![a]);
        assert_eq!(result.nodes_by_level[&1], vec![b, c]);
        assert_eq!(result.nodes_by_level[&2], vec![d]);
        // D is discovered once, by the first edge that reaches it.
        assert_eq!(result.relationships.len(), 3);
        assert_eq!(
            result
                .relationships
                .iter()
                .filter(|edge| edge.target_id == d)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn depth_bound_truncates_chain() {
        let fx = Fixture::new();
        let chain = [
            fx.node("A").await,
            fx.node("B").await,
            fx.node("C").await,
            fx.node("D").await,
            fx.node("E").await,
        ];
        for pair in chain.windows(2) {
            fx.link(pair[0], pair[1]).await;
        }

        let index = GraphIndex::new(&fx.store);
        let result = traverse(&index, &fx.nodes, chain[0], 2, TraversalLimits::default())
            .await
            .expect("traversal should succeed");

        assert_eq!(result.actual_depth, 2);
        assert_eq!(result.nodes_by_level.len(), 3);
        assert_eq!(result.nodes_by_level[&1], vec![chain[1]]);
        assert_eq!(result.nodes_by_level[&2], vec![chain[2]]);
        assert_eq!(result.total_nodes, 3);
        let reached: Vec<NodeId> = result.relationships.iter().map(|e| e.target_id).collect();
        assert!(!reached.contains(&chain[3]));
        assert!(!reached.contains(&chain[4]));
    }

    #[tokio::test]
    async fn leaf_node_yields_single_level() {
        let fx = Fixture::new();
        let a = fx.node("A").await;

        let index = GraphIndex::new(&fx.store);
        let result = traverse(&index, &fx.nodes, a, 10, TraversalLimits::default())
            .await
            .expect("traversal should succeed");

        assert_eq!(result.actual_depth, 0);
        assert_eq!(result.total_nodes, 1);
        assert_eq!(result.nodes_by_level[&0], vec![a]);
        assert!(result.relationships.is_empty());
    }

    #[tokio::test]
    async fn cyclic_graph_terminates_and_visits_once() {
        let fx = Fixture::new();
        let a = fx.node("A").await;
        let b = fx.node("B").await;
        fx.link(a, b).await;
        fx.link(b, a).await;

        let index = GraphIndex::new(&fx.store);
        let result = traverse(&index, &fx.nodes, a, 10, TraversalLimits::default())
            .await
            .expect("traversal should succeed");

        assert_eq!(result.total_nodes, 2);
        assert_eq!(result.nodes_by_level[&0], vec![a]);
        assert_eq!(result.nodes_by_level[&1], vec![b]);
        assert_eq!(result.actual_depth, 1);
    }

    #[tokio::test]
    async fn orphan_edges_are_skipped_not_fatal() {
        let fx = Fixture::new();
        let a = fx.node("A").await;
        let b = fx.node("B").await;
        let ghost = NodeId(Uuid::new_v4());
        fx.link(a, ghost).await;
        fx.link(a, b).await;

        let index = GraphIndex::new(&fx.store);
        let result = traverse(&index, &fx.nodes, a, 10, TraversalLimits::default())
            .await
            .expect("traversal should succeed despite the orphan edge");

        assert_eq!(result.total_nodes, 2);
        assert_eq!(result.nodes_by_level[&1], vec![b]);

        let detection = detect_cycle(&index, &fx.nodes, a, TraversalLimits::default())
            .await
            .expect("detection should succeed despite the orphan edge");
        assert!(!detection.has_cycle);
    }

    #[tokio::test]
    async fn node_ceiling_truncates_traversal() {
        let fx = Fixture::new();
        let a = fx.node("A").await;
        for i in 0..10 {
            let target = fx.node(&format!("N{i}")).await;
            fx.link(a, target).await;
        }

        let index = GraphIndex::new(&fx.store);
        let result = traverse(&index, &fx.nodes, a, 10, TraversalLimits { max_nodes: 4 })
            .await
            .expect("traversal should succeed");

        assert_eq!(result.total_nodes, 4);
        assert_eq!(result.actual_depth, 1);
    }
}
