use std::collections::{HashMap, HashSet};

use anyhow::anyhow;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::algorithms;
use crate::error::{LibError, Result};
use crate::index::GraphIndex;
use crate::models::{
    CreateRelationshipPayload, CycleDetection, ListRelationshipsQuery, NodeId, NodeRelationships,
    Paged, Relationship, RelationshipId, Traversal, TraversalLimits, TraverseQuery,
    UpdateRelationshipPayload,
};
use crate::store::{EdgeStore, NodeDirectory};

/// High-level relationship actions, one variant per engine operation.
///
/// Callers must resolve authentication and node ownership before invoking;
/// the engine only checks node existence through the directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum RelationshipOperation {
    Create {
        payload: CreateRelationshipPayload,
    },
    Get {
        relationship_id: RelationshipId,
    },
    Update {
        relationship_id: RelationshipId,
        payload: UpdateRelationshipPayload,
    },
    Delete {
        relationship_id: RelationshipId,
    },
    List {
        query: ListRelationshipsQuery,
    },
    NodeRelationships {
        node_id: NodeId,
    },
    DeleteForNode {
        node_id: NodeId,
    },
    DetectCycle {
        node_id: NodeId,
    },
    Traverse {
        node_id: NodeId,
        query: TraverseQuery,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RelationshipOperationResult {
    Relationship {
        relationship: Relationship,
    },
    RelationshipsPage {
        page: u32,
        limit: u32,
        total: i64,
        items: Vec<Relationship>,
    },
    NodeRelationships {
        relationships: NodeRelationships,
    },
    CycleDetection {
        detection: CycleDetection,
    },
    Traversal {
        traversal: Traversal,
    },
    Deleted,
    DeletedForNode {
        removed: u64,
    },
}

/// The relationship manager: validates and mutates the edge set, and fronts
/// the two read algorithms. Sole writer of the edge store.
#[derive(Clone)]
pub struct RelationshipOperations<S, N> {
    store: S,
    nodes: N,
    limits: TraversalLimits,
}

impl<S, N> RelationshipOperations<S, N>
where
    S: EdgeStore,
    N: NodeDirectory,
{
    pub fn new(store: S, nodes: N) -> Self {
        Self {
            store,
            nodes,
            limits: TraversalLimits::default(),
        }
    }

    pub fn with_limits(store: S, nodes: N, limits: TraversalLimits) -> Self {
        Self {
            store,
            nodes,
            limits,
        }
    }

    pub async fn execute(
        &self,
        operation: RelationshipOperation,
    ) -> Result<RelationshipOperationResult> {
        match operation {
            RelationshipOperation::Create { payload } => {
                let relationship = self.create_relationship(payload).await?;
                Ok(RelationshipOperationResult::Relationship { relationship })
            }
            RelationshipOperation::Get { relationship_id } => {
                let relationship = self.get_relationship(relationship_id).await?;
                Ok(RelationshipOperationResult::Relationship { relationship })
            }
            RelationshipOperation::Update {
                relationship_id,
                payload,
            } => {
                let relationship = self.update_relationship(relationship_id, payload).await?;
                Ok(RelationshipOperationResult::Relationship { relationship })
            }
            RelationshipOperation::Delete { relationship_id } => {
                self.delete_relationship(relationship_id).await?;
                Ok(RelationshipOperationResult::Deleted)
            }
            RelationshipOperation::List { query } => {
                let page = self.list_relationships(query).await?;
                Ok(RelationshipOperationResult::RelationshipsPage {
                    page: page.page,
                    limit: page.limit,
                    total: page.total,
                    items: page.items,
                })
            }
            RelationshipOperation::NodeRelationships { node_id } => {
                let relationships = self.node_relationships(node_id).await?;
                Ok(RelationshipOperationResult::NodeRelationships { relationships })
            }
            RelationshipOperation::DeleteForNode { node_id } => {
                let removed = self.delete_all_for_node(node_id).await?;
                Ok(RelationshipOperationResult::DeletedForNode { removed })
            }
            RelationshipOperation::DetectCycle { node_id } => {
                let detection = self.detect_cycle(node_id).await?;
                Ok(RelationshipOperationResult::CycleDetection { detection })
            }
            RelationshipOperation::Traverse { node_id, query } => {
                let traversal = self.traverse(node_id, query).await?;
                Ok(RelationshipOperationResult::Traversal { traversal })
            }
        }
    }

    pub async fn create_relationship(
        &self,
        payload: CreateRelationshipPayload,
    ) -> Result<Relationship> {
        let draft = payload.normalize()?;
        let source_name = self.require_node(draft.source_id, "Source node not found").await?;
        let target_name = self.require_node(draft.target_id, "Target node not found").await?;

        if self
            .store
            .triple_exists(draft.source_id, draft.target_id, draft.relationship_type)
            .await?
        {
            return Err(LibError::conflict(
                "duplicate_relationship",
                "Relationship already exists",
                anyhow!(
                    "duplicate triple {} -> {} [{}]",
                    draft.source_id,
                    draft.target_id,
                    draft.relationship_type.as_db_value()
                ),
            ));
        }

        let now = Utc::now().naive_utc();
        let mut relationship = Relationship::create(draft, now);

        if relationship.direction.is_bidirectional() {
            // An existing reverse triple is not an error; mirrors are
            // independent rows. Only missing mirrors are created, atomically
            // with the forward edge.
            let reverse_exists = self
                .store
                .triple_exists(
                    relationship.target_id,
                    relationship.source_id,
                    relationship.relationship_type,
                )
                .await?;
            if reverse_exists {
                self.store.insert(&relationship).await?;
            } else {
                let mirror = relationship.mirror(now);
                self.store.insert_pair(&relationship, &mirror).await?;
                tracing::info!(
                    source = %mirror.source_id,
                    target = %mirror.target_id,
                    "mirror relationship created"
                );
            }
        } else {
            self.store.insert(&relationship).await?;
        }

        tracing::info!(
            source = %relationship.source_id,
            target = %relationship.target_id,
            relationship_type = relationship.relationship_type.as_db_value(),
            "relationship created"
        );

        relationship.source_name = Some(source_name);
        relationship.target_name = Some(target_name);
        Ok(relationship)
    }

    pub async fn get_relationship(&self, id: RelationshipId) -> Result<Relationship> {
        let mut relationship = self.require_relationship(id).await?;
        self.enrich(std::slice::from_mut(&mut relationship)).await?;
        Ok(relationship)
    }

    pub async fn update_relationship(
        &self,
        id: RelationshipId,
        payload: UpdateRelationshipPayload,
    ) -> Result<Relationship> {
        let mut relationship = self.require_relationship(id).await?;

        let type_change = payload
            .relationship_type
            .filter(|new_type| *new_type != relationship.relationship_type);

        // A retype must keep the mirror half of a bidirectional pair in
        // step, or pair deletion can no longer find it.
        let mut mirror = None;
        if let Some(new_type) = type_change {
            if self
                .store
                .triple_exists(relationship.source_id, relationship.target_id, new_type)
                .await?
            {
                return Err(LibError::conflict(
                    "duplicate_relationship",
                    "Relationship already exists",
                    anyhow!(
                        "type change collides with triple {} -> {} [{}]",
                        relationship.source_id,
                        relationship.target_id,
                        new_type.as_db_value()
                    ),
                ));
            }

            if relationship.direction.is_bidirectional() {
                mirror = self
                    .store
                    .find_triple(
                        relationship.target_id,
                        relationship.source_id,
                        relationship.relationship_type,
                    )
                    .await?;
                if mirror.is_some()
                    && self
                        .store
                        .triple_exists(relationship.target_id, relationship.source_id, new_type)
                        .await?
                {
                    return Err(LibError::conflict(
                        "duplicate_relationship",
                        "Relationship already exists",
                        anyhow!(
                            "type change collides with triple {} -> {} [{}]",
                            relationship.target_id,
                            relationship.source_id,
                            new_type.as_db_value()
                        ),
                    ));
                }
            }
        }

        if !payload.is_empty() {
            let now = Utc::now().naive_utc();
            relationship.apply_update(&payload, now);
            self.store.update(&relationship).await?;
            tracing::info!(relationship = %id, "relationship updated");

            if let Some(mut mirror) = mirror {
                mirror.relationship_type = relationship.relationship_type;
                mirror.updated_at = now;
                self.store.update(&mirror).await?;
                tracing::info!(relationship = %mirror.id, "mirror relationship retyped");
            }
        }

        self.enrich(std::slice::from_mut(&mut relationship)).await?;
        Ok(relationship)
    }

    pub async fn delete_relationship(&self, id: RelationshipId) -> Result<()> {
        let relationship = self.require_relationship(id).await?;
        self.store.remove(id).await?;
        tracing::info!(relationship = %id, "relationship deleted");

        // Pair-deletion policy: removing either half of a bidirectional
        // relationship removes its mirror as well.
        if relationship.direction.is_bidirectional() {
            let removed = self
                .store
                .remove_triple(
                    relationship.target_id,
                    relationship.source_id,
                    relationship.relationship_type,
                )
                .await?;
            if removed > 0 {
                tracing::info!(relationship = %id, "mirror relationship deleted");
            }
        }
        Ok(())
    }

    pub async fn delete_all_for_node(&self, node_id: NodeId) -> Result<u64> {
        let removed = self.store.remove_for_node(node_id).await?;
        if removed > 0 {
            tracing::info!(node = %node_id, removed, "cascade deleted node relationships");
        }
        Ok(removed)
    }

    pub async fn list_relationships(
        &self,
        query: ListRelationshipsQuery,
    ) -> Result<Paged<Relationship>> {
        let (page, limit) = query.pagination();
        let filter = query.filter();
        let mut items = self.store.list(&filter, page, limit).await?;
        let total = self.store.count(&filter).await?;
        self.enrich(&mut items).await?;
        Ok(Paged {
            page,
            limit,
            total,
            items,
        })
    }

    pub async fn node_relationships(&self, node_id: NodeId) -> Result<NodeRelationships> {
        let node_name = self.require_node(node_id, "Node not found").await?;
        let index = GraphIndex::new(&self.store);
        let mut upstream = index.incoming(node_id).await?;
        let mut downstream = index.outgoing(node_id).await?;
        self.enrich(&mut upstream).await?;
        self.enrich(&mut downstream).await?;
        Ok(NodeRelationships::new(
            node_id,
            Some(node_name),
            upstream,
            downstream,
        ))
    }

    pub async fn detect_cycle(&self, node_id: NodeId) -> Result<CycleDetection> {
        self.require_node(node_id, "Node not found").await?;
        let index = GraphIndex::new(&self.store);
        algorithms::detect_cycle(&index, &self.nodes, node_id, self.limits).await
    }

    pub async fn traverse(&self, node_id: NodeId, query: TraverseQuery) -> Result<Traversal> {
        let max_depth = query.resolve_depth()?;
        self.require_node(node_id, "Node not found").await?;
        let index = GraphIndex::new(&self.store);
        algorithms::traverse(&index, &self.nodes, node_id, max_depth, self.limits).await
    }

    async fn require_node(&self, node_id: NodeId, public: &'static str) -> Result<String> {
        match self.nodes.node_name(node_id).await? {
            Some(name) => Ok(name),
            None => Err(LibError::not_found_with_code(
                "node_not_found",
                public,
                anyhow!("node {} not found", node_id),
            )),
        }
    }

    async fn require_relationship(&self, id: RelationshipId) -> Result<Relationship> {
        match self.store.fetch(id).await? {
            Some(relationship) => Ok(relationship),
            None => Err(LibError::not_found_with_code(
                "relationship_not_found",
                "Relationship not found",
                anyhow!("relationship {} not found", id),
            )),
        }
    }

    /// Fills display names from the node directory. Missing nodes leave the
    /// name empty rather than failing the read.
    async fn enrich(&self, relationships: &mut [Relationship]) -> Result<()> {
        if relationships.is_empty() {
            return Ok(());
        }

        let mut node_ids: HashSet<NodeId> = HashSet::new();
        for relationship in relationships.iter() {
            node_ids.insert(relationship.source_id);
            node_ids.insert(relationship.target_id);
        }

        let mut names: HashMap<NodeId, String> = HashMap::with_capacity(node_ids.len());
        for node_id in node_ids {
            if let Some(name) = self.nodes.node_name(node_id).await? {
                names.insert(node_id, name);
            }
        }

        for relationship in relationships.iter_mut() {
            relationship.source_name = names.get(&relationship.source_id).cloned();
            relationship.target_name = names.get(&relationship.target_id).cloned();
        }
        Ok(())
    }
}
