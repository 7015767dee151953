use async_trait::async_trait;

use crate::error::Result;
use crate::models::{NodeId, Relationship, RelationshipFilter, RelationshipId, RelationshipType};

pub mod memory;

/// Durable edge storage. The relationship manager is the sole writer; the
/// graph index reads through `outgoing`/`incoming`, which must return edges
/// in insertion order (the deterministic edge-iteration contract).
#[async_trait]
pub trait EdgeStore: Send + Sync {
    async fn insert(&self, edge: &Relationship) -> Result<()>;

    /// Inserts both halves of a bidirectional pair atomically: either both
    /// rows land or neither does.
    async fn insert_pair(&self, forward: &Relationship, mirror: &Relationship) -> Result<()>;

    async fn fetch(&self, id: RelationshipId) -> Result<Option<Relationship>>;

    /// Persists the mutable fields of an existing edge.
    async fn update(&self, edge: &Relationship) -> Result<()>;

    /// Returns whether an edge was actually removed.
    async fn remove(&self, id: RelationshipId) -> Result<bool>;

    /// Removes the edge matching a `(source, target, type)` triple, if any.
    async fn remove_triple(
        &self,
        source_id: NodeId,
        target_id: NodeId,
        relationship_type: RelationshipType,
    ) -> Result<u64>;

    /// Cascade used on node deletion: removes every edge touching the node.
    async fn remove_for_node(&self, node_id: NodeId) -> Result<u64>;

    async fn triple_exists(
        &self,
        source_id: NodeId,
        target_id: NodeId,
        relationship_type: RelationshipType,
    ) -> Result<bool>;

    /// Fetches the edge matching a `(source, target, type)` triple, if any.
    async fn find_triple(
        &self,
        source_id: NodeId,
        target_id: NodeId,
        relationship_type: RelationshipType,
    ) -> Result<Option<Relationship>>;

    async fn outgoing(&self, node_id: NodeId) -> Result<Vec<Relationship>>;

    async fn incoming(&self, node_id: NodeId) -> Result<Vec<Relationship>>;

    async fn list(
        &self,
        filter: &RelationshipFilter,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Relationship>>;

    async fn count(&self, filter: &RelationshipFilter) -> Result<i64>;
}

/// The external node subsystem, seen through the narrow surface the engine
/// needs: existence checks and display names.
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    async fn node_exists(&self, id: NodeId) -> Result<bool>;

    async fn node_name(&self, id: NodeId) -> Result<Option<String>>;
}
