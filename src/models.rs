use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LibError, Result};

/// Default traversal depth when the caller leaves `maxDepth` unset.
pub const DEFAULT_MAX_DEPTH: u32 = 10;
/// Hard ceiling for caller-supplied traversal depth.
pub const MAX_DEPTH: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NodeId(pub Uuid);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::from_str(s).map(Self)
    }
}

impl From<Uuid> for NodeId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct RelationshipId(pub Uuid);

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RelationshipId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::from_str(s).map(Self)
    }
}

impl From<Uuid> for RelationshipId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Semantic meaning of an edge. Does not affect traversal eligibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    #[default]
    Dependency,
    Call,
    Deployment,
    Ownership,
    Association,
}

impl RelationshipType {
    pub const fn as_db_value(self) -> &'static str {
        match self {
            RelationshipType::Dependency => "dependency",
            RelationshipType::Call => "call",
            RelationshipType::Deployment => "deployment",
            RelationshipType::Ownership => "ownership",
            RelationshipType::Association => "association",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "dependency" => Some(RelationshipType::Dependency),
            "call" => Some(RelationshipType::Call),
            "deployment" => Some(RelationshipType::Deployment),
            "ownership" => Some(RelationshipType::Ownership),
            "association" => Some(RelationshipType::Association),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipDirection {
    #[default]
    Unidirectional,
    Bidirectional,
}

impl RelationshipDirection {
    pub const fn as_db_value(self) -> &'static str {
        match self {
            RelationshipDirection::Unidirectional => "unidirectional",
            RelationshipDirection::Bidirectional => "bidirectional",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "unidirectional" => Some(RelationshipDirection::Unidirectional),
            "bidirectional" => Some(RelationshipDirection::Bidirectional),
            _ => None,
        }
    }

    pub const fn is_bidirectional(self) -> bool {
        matches!(self, RelationshipDirection::Bidirectional)
    }
}

/// Qualitative weight. Informational only, never consulted by the algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipStrength {
    #[default]
    Strong,
    Weak,
}

impl RelationshipStrength {
    pub const fn as_db_value(self) -> &'static str {
        match self {
            RelationshipStrength::Strong => "strong",
            RelationshipStrength::Weak => "weak",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "strong" => Some(RelationshipStrength::Strong),
            "weak" => Some(RelationshipStrength::Weak),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipStatus {
    #[default]
    Normal,
    Abnormal,
}

impl RelationshipStatus {
    pub const fn as_db_value(self) -> &'static str {
        match self {
            RelationshipStatus::Normal => "normal",
            RelationshipStatus::Abnormal => "abnormal",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(RelationshipStatus::Normal),
            "abnormal" => Some(RelationshipStatus::Abnormal),
            _ => None,
        }
    }
}

/// A typed, directed edge between two nodes. The sole entity owned by the
/// graph engine; node lifecycle belongs to the surrounding resource
/// subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: RelationshipId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub relationship_type: RelationshipType,
    pub direction: RelationshipDirection,
    pub strength: RelationshipStrength,
    pub status: RelationshipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    // Display enrichment, filled from the node directory, never persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

impl Relationship {
    pub fn create(draft: RelationshipDraft, now: NaiveDateTime) -> Self {
        Self {
            id: RelationshipId(Uuid::new_v4()),
            source_id: draft.source_id,
            target_id: draft.target_id,
            relationship_type: draft.relationship_type,
            direction: draft.direction,
            strength: draft.strength,
            status: RelationshipStatus::Normal,
            description: draft.description,
            created_at: now,
            updated_at: now,
            source_name: None,
            target_name: None,
        }
    }

    /// The reverse half of a bidirectional pair: swapped endpoints, shared
    /// semantic attributes, its own id.
    pub fn mirror(&self, now: NaiveDateTime) -> Self {
        Self {
            id: RelationshipId(Uuid::new_v4()),
            source_id: self.target_id,
            target_id: self.source_id,
            relationship_type: self.relationship_type,
            direction: self.direction,
            strength: self.strength,
            status: RelationshipStatus::Normal,
            description: self.description.clone(),
            created_at: now,
            updated_at: now,
            source_name: None,
            target_name: None,
        }
    }

    /// Applies the supplied fields of an update. Endpoints never change.
    pub fn apply_update(&mut self, payload: &UpdateRelationshipPayload, now: NaiveDateTime) {
        if let Some(relationship_type) = payload.relationship_type {
            self.relationship_type = relationship_type;
        }
        if let Some(strength) = payload.strength {
            self.strength = strength;
        }
        if let Some(status) = payload.status {
            self.status = status;
        }
        if let Some(description) = &payload.description {
            let trimmed = description.trim();
            self.description = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        self.updated_at = now;
    }
}

/// Validated input for `create_relationship`.
#[derive(Debug, Clone)]
pub struct RelationshipDraft {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub relationship_type: RelationshipType,
    pub direction: RelationshipDirection,
    pub strength: RelationshipStrength,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRelationshipPayload {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub relationship_type: RelationshipType,
    pub direction: RelationshipDirection,
    #[serde(default)]
    pub strength: RelationshipStrength,
    pub description: Option<String>,
}

impl CreateRelationshipPayload {
    pub fn normalize(self) -> Result<RelationshipDraft> {
        if self.source_id == self.target_id {
            return Err(LibError::invalid_with_code(
                "self_loop_not_allowed",
                "A resource cannot depend on itself",
                anyhow!("self-loop on node {}", self.source_id),
            ));
        }

        let description = self
            .description
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        Ok(RelationshipDraft {
            source_id: self.source_id,
            target_id: self.target_id,
            relationship_type: self.relationship_type,
            direction: self.direction,
            strength: self.strength,
            description,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRelationshipPayload {
    pub relationship_type: Option<RelationshipType>,
    pub strength: Option<RelationshipStrength>,
    pub status: Option<RelationshipStatus>,
    pub description: Option<String>,
}

impl UpdateRelationshipPayload {
    pub fn is_empty(&self) -> bool {
        self.relationship_type.is_none()
            && self.strength.is_none()
            && self.status.is_none()
            && self.description.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRelationshipsQuery {
    pub source_id: Option<NodeId>,
    pub target_id: Option<NodeId>,
    pub relationship_type: Option<RelationshipType>,
    pub status: Option<RelationshipStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListRelationshipsQuery {
    pub fn pagination(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(25).clamp(1, 200);
        (page, limit)
    }

    pub fn filter(&self) -> RelationshipFilter {
        RelationshipFilter {
            source_id: self.source_id,
            target_id: self.target_id,
            relationship_type: self.relationship_type,
            status: self.status,
        }
    }
}

/// Storage-level filter for listing edges. No graph semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationshipFilter {
    pub source_id: Option<NodeId>,
    pub target_id: Option<NodeId>,
    pub relationship_type: Option<RelationshipType>,
    pub status: Option<RelationshipStatus>,
}

impl RelationshipFilter {
    pub fn matches(&self, edge: &Relationship) -> bool {
        self.source_id.is_none_or(|id| edge.source_id == id)
            && self.target_id.is_none_or(|id| edge.target_id == id)
            && self
                .relationship_type
                .is_none_or(|t| edge.relationship_type == t)
            && self.status.is_none_or(|s| edge.status == s)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub items: Vec<T>,
}

/// Upstream/downstream summary for one node, grouped by type for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRelationships {
    pub node_id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    pub upstream: Vec<Relationship>,
    pub downstream: Vec<Relationship>,
    pub upstream_by_type: BTreeMap<RelationshipType, Vec<Relationship>>,
    pub downstream_by_type: BTreeMap<RelationshipType, Vec<Relationship>>,
    pub upstream_count: usize,
    pub downstream_count: usize,
}

impl NodeRelationships {
    pub fn new(
        node_id: NodeId,
        node_name: Option<String>,
        upstream: Vec<Relationship>,
        downstream: Vec<Relationship>,
    ) -> Self {
        Self {
            node_id,
            node_name,
            upstream_count: upstream.len(),
            downstream_count: downstream.len(),
            upstream_by_type: group_by_type(&upstream),
            downstream_by_type: group_by_type(&downstream),
            upstream,
            downstream,
        }
    }
}

fn group_by_type(edges: &[Relationship]) -> BTreeMap<RelationshipType, Vec<Relationship>> {
    let mut grouped: BTreeMap<RelationshipType, Vec<Relationship>> = BTreeMap::new();
    for edge in edges {
        grouped
            .entry(edge.relationship_type)
            .or_default()
            .push(edge.clone());
    }
    grouped
}

/// Answer to the cycle query. A found cycle is a successful result, not an
/// error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleDetection {
    pub has_cycle: bool,
    pub cycle_path: Vec<NodeId>,
}

impl CycleDetection {
    pub fn no_cycle() -> Self {
        Self {
            has_cycle: false,
            cycle_path: Vec::new(),
        }
    }

    pub fn with_cycle(cycle_path: Vec<NodeId>) -> Self {
        Self {
            has_cycle: true,
            cycle_path,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraverseQuery {
    pub max_depth: Option<u32>,
}

impl TraverseQuery {
    /// Missing depth falls back to the default; explicit values outside
    /// [1, MAX_DEPTH] are rejected.
    pub fn resolve_depth(&self) -> Result<u32> {
        match self.max_depth {
            None => Ok(DEFAULT_MAX_DEPTH),
            Some(depth) if (1..=MAX_DEPTH).contains(&depth) => Ok(depth),
            Some(depth) => Err(LibError::invalid_with_code(
                "invalid_depth",
                "Traversal depth must be between 1 and 100",
                anyhow!("maxDepth {} out of range", depth),
            )),
        }
    }
}

/// Levelled view of the graph outward from a start node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Traversal {
    pub start_id: NodeId,
    pub nodes_by_level: BTreeMap<u32, Vec<NodeId>>,
    /// Edges that discovered a new node, in discovery order.
    pub relationships: Vec<Relationship>,
    pub actual_depth: u32,
    pub total_nodes: usize,
}

impl Traversal {
    pub fn new(
        start_id: NodeId,
        nodes_by_level: BTreeMap<u32, Vec<NodeId>>,
        relationships: Vec<Relationship>,
    ) -> Self {
        let actual_depth = nodes_by_level.keys().next_back().copied().unwrap_or(0);
        let total_nodes = nodes_by_level.values().map(Vec::len).sum();
        Self {
            start_id,
            nodes_by_level,
            relationships,
            actual_depth,
            total_nodes,
        }
    }
}

/// Hardening ceiling for the read algorithms, independent of `maxDepth`.
#[derive(Debug, Clone, Copy)]
pub struct TraversalLimits {
    pub max_nodes: usize,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self { max_nodes: 1000 }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn payload(source: NodeId, target: NodeId) -> CreateRelationshipPayload {
        CreateRelationshipPayload {
            source_id: source,
            target_id: target,
            relationship_type: RelationshipType::Dependency,
            direction: RelationshipDirection::Unidirectional,
            strength: RelationshipStrength::Strong,
            description: None,
        }
    }

    #[test]
    fn normalize_rejects_self_loop() {
        let node = NodeId(Uuid::new_v4());
        let err = payload(node, node)
            .normalize()
            .expect_err("self-loop should fail");
        assert_eq!(err.code, "self_loop_not_allowed");
    }

    #[test]
    fn normalize_trims_description() {
        let mut input = payload(NodeId(Uuid::new_v4()), NodeId(Uuid::new_v4()));
        input.description = Some("  calls the billing API  ".to_string());
        let draft = input.normalize().expect("payload should normalize");
        assert_eq!(draft.description.as_deref(), Some("calls the billing API"));

        let mut blank = payload(NodeId(Uuid::new_v4()), NodeId(Uuid::new_v4()));
        blank.description = Some("   ".to_string());
        let draft = blank.normalize().expect("payload should normalize");
        assert_eq!(draft.description, None);
    }

    #[test]
    fn enums_round_trip_through_db_values() {
        for t in [
            RelationshipType::Dependency,
            RelationshipType::Call,
            RelationshipType::Deployment,
            RelationshipType::Ownership,
            RelationshipType::Association,
        ] {
            assert_eq!(RelationshipType::from_db_value(t.as_db_value()), Some(t));
        }
        assert_eq!(RelationshipType::from_db_value("linked"), None);
        assert_eq!(RelationshipDirection::from_db_value("sideways"), None);
    }

    #[test]
    fn relationship_type_uses_wire_names() {
        let value = serde_json::to_value(RelationshipType::Deployment).expect("serializes");
        assert_eq!(value, json!("DEPLOYMENT"));
        let parsed: RelationshipType =
            serde_json::from_value(json!("OWNERSHIP")).expect("deserializes");
        assert_eq!(parsed, RelationshipType::Ownership);
        assert!(serde_json::from_value::<RelationshipType>(json!("LINKED")).is_err());
    }

    #[test]
    fn update_applies_only_supplied_fields() {
        let draft = payload(NodeId(Uuid::new_v4()), NodeId(Uuid::new_v4()))
            .normalize()
            .expect("payload should normalize");
        let created = chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
            .expect("valid date")
            .and_hms_opt(0, 0, 0)
            .expect("valid datetime");
        let mut edge = Relationship::create(draft, created);
        edge.description = Some("original".to_string());

        let update = UpdateRelationshipPayload {
            strength: Some(RelationshipStrength::Weak),
            ..Default::default()
        };
        let later = created + chrono::Duration::hours(1);
        edge.apply_update(&update, later);

        assert_eq!(edge.strength, RelationshipStrength::Weak);
        assert_eq!(edge.relationship_type, RelationshipType::Dependency);
        assert_eq!(edge.status, RelationshipStatus::Normal);
        assert_eq!(edge.description.as_deref(), Some("original"));
        assert_eq!(edge.updated_at, later);
    }

    #[test]
    fn update_blank_description_clears_it() {
        let draft = payload(NodeId(Uuid::new_v4()), NodeId(Uuid::new_v4()))
            .normalize()
            .expect("payload should normalize");
        let now = chrono::Utc::now().naive_utc();
        let mut edge = Relationship::create(draft, now);
        edge.description = Some("stale".to_string());

        let update = UpdateRelationshipPayload {
            description: Some("  ".to_string()),
            ..Default::default()
        };
        edge.apply_update(&update, now);
        assert_eq!(edge.description, None);
    }

    #[test]
    fn mirror_swaps_endpoints_and_keeps_attributes() {
        let mut input = payload(NodeId(Uuid::new_v4()), NodeId(Uuid::new_v4()));
        input.direction = RelationshipDirection::Bidirectional;
        input.description = Some("shared link".to_string());
        let draft = input.normalize().expect("payload should normalize");
        let now = chrono::Utc::now().naive_utc();
        let forward = Relationship::create(draft, now);
        let mirror = forward.mirror(now);

        assert_eq!(mirror.source_id, forward.target_id);
        assert_eq!(mirror.target_id, forward.source_id);
        assert_eq!(mirror.relationship_type, forward.relationship_type);
        assert_eq!(mirror.strength, forward.strength);
        assert_eq!(mirror.description, forward.description);
        assert_ne!(mirror.id, forward.id);
    }

    #[test]
    fn list_query_clamps_pagination() {
        let query = ListRelationshipsQuery {
            page: Some(0),
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(query.pagination(), (1, 200));
        assert_eq!(ListRelationshipsQuery::default().pagination(), (1, 25));
    }

    #[test]
    fn traverse_query_validates_depth() {
        assert_eq!(
            TraverseQuery::default().resolve_depth().expect("default"),
            DEFAULT_MAX_DEPTH
        );
        assert_eq!(
            TraverseQuery { max_depth: Some(100) }
                .resolve_depth()
                .expect("upper bound"),
            100
        );
        for bad in [0, 101] {
            let err = TraverseQuery {
                max_depth: Some(bad),
            }
            .resolve_depth()
            .expect_err("out of range should fail");
            assert_eq!(err.code, "invalid_depth");
        }
    }

    #[test]
    fn node_relationships_groups_by_type() {
        let a = NodeId(Uuid::new_v4());
        let b = NodeId(Uuid::new_v4());
        let c = NodeId(Uuid::new_v4());
        let now = chrono::Utc::now().naive_utc();

        let mut call = payload(a, b);
        call.relationship_type = RelationshipType::Call;
        let downstream = vec![
            Relationship::create(payload(a, b).normalize().expect("draft"), now),
            Relationship::create(call.normalize().expect("draft"), now),
        ];
        let upstream = vec![Relationship::create(
            payload(c, a).normalize().expect("draft"),
            now,
        )];

        let summary = NodeRelationships::new(a, Some("web-app".to_string()), upstream, downstream);
        assert_eq!(summary.downstream_count, 2);
        assert_eq!(summary.upstream_count, 1);
        assert_eq!(
            summary.downstream_by_type[&RelationshipType::Dependency].len(),
            1
        );
        assert_eq!(summary.downstream_by_type[&RelationshipType::Call].len(), 1);
        assert_eq!(
            summary.upstream_by_type[&RelationshipType::Dependency].len(),
            1
        );
    }

    #[test]
    fn traversal_computes_depth_and_totals() {
        let start = NodeId(Uuid::new_v4());
        let child = NodeId(Uuid::new_v4());
        let mut levels = BTreeMap::new();
        levels.insert(0, vec![start]);
        levels.insert(1, vec![child]);

        let result = Traversal::new(start, levels, Vec::new());
        assert_eq!(result.actual_depth, 1);
        assert_eq!(result.total_nodes, 2);

        let only_start = Traversal::new(start, BTreeMap::from([(0, vec![start])]), Vec::new());
        assert_eq!(only_start.actual_depth, 0);
        assert_eq!(only_start.total_nodes, 1);
    }
}
