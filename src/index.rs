use crate::error::Result;
use crate::models::{NodeId, Relationship};
use crate::store::EdgeStore;

/// Read-only adjacency view over an [`EdgeStore`]. Answers per-node edge
/// lookups in O(degree) through the store's secondary indexes and never
/// mutates anything; both algorithms read the graph exclusively through it.
pub struct GraphIndex<'a, S: EdgeStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: EdgeStore + ?Sized> GraphIndex<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Edges where `node_id` is the source, in insertion order.
    pub async fn outgoing(&self, node_id: NodeId) -> Result<Vec<Relationship>> {
        self.store.outgoing(node_id).await
    }

    /// Edges where `node_id` is the target, in insertion order.
    pub async fn incoming(&self, node_id: NodeId) -> Result<Vec<Relationship>> {
        self.store.incoming(node_id).await
    }
}
