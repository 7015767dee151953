use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{LibError, Result};
use crate::models::{NodeId, Relationship, RelationshipFilter, RelationshipId, RelationshipType};
use crate::store::{EdgeStore, NodeDirectory};

/// Ephemeral edge store backed by hash maps. Used by the tests, the benches,
/// and anything that wants the engine without Postgres. Adjacency lists keep
/// push order, so iteration order matches insertion order.
#[derive(Clone, Default)]
pub struct MemoryEdgeStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    edges: HashMap<RelationshipId, Relationship>,
    order: Vec<RelationshipId>,
    outgoing: HashMap<NodeId, Vec<RelationshipId>>,
    incoming: HashMap<NodeId, Vec<RelationshipId>>,
}

impl Inner {
    fn insert_edge(&mut self, edge: &Relationship) -> Result<()> {
        if self.triple_taken(edge.source_id, edge.target_id, edge.relationship_type) {
            return Err(LibError::conflict(
                "duplicate_relationship",
                "Relationship already exists",
                anyhow!(
                    "duplicate triple {} -> {} [{}]",
                    edge.source_id,
                    edge.target_id,
                    edge.relationship_type.as_db_value()
                ),
            ));
        }

        self.order.push(edge.id);
        self.outgoing.entry(edge.source_id).or_default().push(edge.id);
        self.incoming.entry(edge.target_id).or_default().push(edge.id);
        self.edges.insert(edge.id, edge.clone());
        Ok(())
    }

    fn triple_taken(
        &self,
        source_id: NodeId,
        target_id: NodeId,
        relationship_type: RelationshipType,
    ) -> bool {
        self.outgoing
            .get(&source_id)
            .is_some_and(|ids| {
                ids.iter().filter_map(|id| self.edges.get(id)).any(|edge| {
                    edge.target_id == target_id && edge.relationship_type == relationship_type
                })
            })
    }

    fn detach(&mut self, edge: &Relationship) {
        self.order.retain(|id| *id != edge.id);
        if let Some(ids) = self.outgoing.get_mut(&edge.source_id) {
            ids.retain(|id| *id != edge.id);
        }
        if let Some(ids) = self.incoming.get_mut(&edge.target_id) {
            ids.retain(|id| *id != edge.id);
        }
    }

    fn collect(&self, ids: &[RelationshipId]) -> Vec<Relationship> {
        ids.iter()
            .filter_map(|id| self.edges.get(id))
            .cloned()
            .collect()
    }
}

impl MemoryEdgeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EdgeStore for MemoryEdgeStore {
    async fn insert(&self, edge: &Relationship) -> Result<()> {
        self.inner.lock().await.insert_edge(edge)
    }

    async fn insert_pair(&self, forward: &Relationship, mirror: &Relationship) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.insert_edge(forward)?;
        if let Err(err) = inner.insert_edge(mirror) {
            let forward = forward.clone();
            inner.detach(&forward);
            inner.edges.remove(&forward.id);
            return Err(err);
        }
        Ok(())
    }

    async fn fetch(&self, id: RelationshipId) -> Result<Option<Relationship>> {
        Ok(self.inner.lock().await.edges.get(&id).cloned())
    }

    async fn update(&self, edge: &Relationship) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.edges.contains_key(&edge.id) {
            return Err(LibError::not_found_with_code(
                "relationship_not_found",
                "Relationship not found",
                anyhow!("relationship {} not stored", edge.id),
            ));
        }
        inner.edges.insert(edge.id, edge.clone());
        Ok(())
    }

    async fn remove(&self, id: RelationshipId) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(edge) = inner.edges.remove(&id) else {
            return Ok(false);
        };
        inner.detach(&edge);
        Ok(true)
    }

    async fn remove_triple(
        &self,
        source_id: NodeId,
        target_id: NodeId,
        relationship_type: RelationshipType,
    ) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let matching: Vec<Relationship> = inner
            .outgoing
            .get(&source_id)
            .map(|ids| inner.collect(ids))
            .unwrap_or_default()
            .into_iter()
            .filter(|edge| {
                edge.target_id == target_id && edge.relationship_type == relationship_type
            })
            .collect();

        for edge in &matching {
            inner.edges.remove(&edge.id);
            inner.detach(edge);
        }
        Ok(matching.len() as u64)
    }

    async fn remove_for_node(&self, node_id: NodeId) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let touching: Vec<Relationship> = inner
            .edges
            .values()
            .filter(|edge| edge.source_id == node_id || edge.target_id == node_id)
            .cloned()
            .collect();

        for edge in &touching {
            inner.edges.remove(&edge.id);
            inner.detach(edge);
        }
        Ok(touching.len() as u64)
    }

    async fn triple_exists(
        &self,
        source_id: NodeId,
        target_id: NodeId,
        relationship_type: RelationshipType,
    ) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .await
            .triple_taken(source_id, target_id, relationship_type))
    }

    async fn find_triple(
        &self,
        source_id: NodeId,
        target_id: NodeId,
        relationship_type: RelationshipType,
    ) -> Result<Option<Relationship>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .outgoing
            .get(&source_id)
            .and_then(|ids| {
                ids.iter().filter_map(|id| inner.edges.get(id)).find(|edge| {
                    edge.target_id == target_id && edge.relationship_type == relationship_type
                })
            })
            .cloned())
    }

    async fn outgoing(&self, node_id: NodeId) -> Result<Vec<Relationship>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .outgoing
            .get(&node_id)
            .map(|ids| inner.collect(ids))
            .unwrap_or_default())
    }

    async fn incoming(&self, node_id: NodeId) -> Result<Vec<Relationship>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .incoming
            .get(&node_id)
            .map(|ids| inner.collect(ids))
            .unwrap_or_default())
    }

    async fn list(
        &self,
        filter: &RelationshipFilter,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Relationship>> {
        let inner = self.inner.lock().await;
        let offset = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        // Newest first, matching the Postgres backend's listing order.
        Ok(inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.edges.get(id))
            .filter(|edge| filter.matches(edge))
            .skip(offset)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &RelationshipFilter) -> Result<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .edges
            .values()
            .filter(|edge| filter.matches(edge))
            .count() as i64)
    }
}

/// In-memory node directory for tests and the demo server.
#[derive(Clone, Default)]
pub struct MemoryNodeDirectory {
    nodes: Arc<Mutex<HashMap<NodeId, String>>>,
}

impl MemoryNodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_node(&self, id: NodeId, name: impl Into<String>) {
        self.nodes.lock().await.insert(id, name.into());
    }

    pub async fn remove_node(&self, id: NodeId) {
        self.nodes.lock().await.remove(&id);
    }
}

#[async_trait]
impl NodeDirectory for MemoryNodeDirectory {
    async fn node_exists(&self, id: NodeId) -> Result<bool> {
        Ok(self.nodes.lock().await.contains_key(&id))
    }

    async fn node_name(&self, id: NodeId) -> Result<Option<String>> {
        Ok(self.nodes.lock().await.get(&id).cloned())
    }
}
