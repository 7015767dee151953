pub mod algorithms;
#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod index;
pub mod models;
pub mod operations;
pub mod store;

pub mod prelude {
    pub use crate::algorithms::{detect_cycle, traverse};
    #[cfg(feature = "api")]
    pub use crate::api::{AppError, RelationshipApp};
    #[cfg(feature = "sqlx")]
    pub use crate::db::{PgEdgeStore, PgNodeDirectory, create_graph_tables};
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::index::GraphIndex;
    pub use crate::models::{
        CreateRelationshipPayload, CycleDetection, ListRelationshipsQuery, NodeId,
        NodeRelationships, Paged, Relationship, RelationshipDirection, RelationshipId,
        RelationshipStatus, RelationshipStrength, RelationshipType, Traversal, TraversalLimits,
        TraverseQuery, UpdateRelationshipPayload,
    };
    pub use crate::operations::{
        RelationshipOperation, RelationshipOperationResult, RelationshipOperations,
    };
    pub use crate::store::memory::{MemoryEdgeStore, MemoryNodeDirectory};
    pub use crate::store::{EdgeStore, NodeDirectory};
}
