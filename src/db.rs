use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{LibError, Result};
use crate::models::{
    NodeId, Relationship, RelationshipDirection, RelationshipFilter, RelationshipId,
    RelationshipStatus, RelationshipStrength, RelationshipType,
};
use crate::store::{EdgeStore, NodeDirectory};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_graph_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

const RELATIONSHIP_COLUMNS: &str = r#"
    id,
    source_id,
    target_id,
    relationship_type,
    direction,
    strength,
    status,
    description,
    created_at,
    updated_at
"#;

#[derive(Debug, Clone, FromRow)]
struct RelationshipRow {
    id: Uuid,
    source_id: Uuid,
    target_id: Uuid,
    relationship_type: String,
    direction: String,
    strength: String,
    status: String,
    description: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl TryFrom<RelationshipRow> for Relationship {
    type Error = LibError;

    fn try_from(row: RelationshipRow) -> Result<Self> {
        let relationship_type = RelationshipType::from_db_value(&row.relationship_type)
            .ok_or_else(|| stored_enum_err("relationship_type", &row.relationship_type, row.id))?;
        let direction = RelationshipDirection::from_db_value(&row.direction)
            .ok_or_else(|| stored_enum_err("direction", &row.direction, row.id))?;
        let strength = RelationshipStrength::from_db_value(&row.strength)
            .ok_or_else(|| stored_enum_err("strength", &row.strength, row.id))?;
        let status = RelationshipStatus::from_db_value(&row.status)
            .ok_or_else(|| stored_enum_err("status", &row.status, row.id))?;

        Ok(Relationship {
            id: RelationshipId(row.id),
            source_id: NodeId(row.source_id),
            target_id: NodeId(row.target_id),
            relationship_type,
            direction,
            strength,
            status,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            source_name: None,
            target_name: None,
        })
    }
}

fn stored_enum_err(column: &'static str, value: &str, id: Uuid) -> LibError {
    LibError::database(
        "Stored relationship is corrupt",
        anyhow!("relationship {} has unrecognized {}: {}", id, column, value),
    )
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    if is_unique_violation(&err) {
        return LibError::conflict(
            "duplicate_relationship",
            "Relationship already exists",
            anyhow!(err),
        );
    }
    LibError::database(public, anyhow!(err))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

fn hydrate(rows: Vec<RelationshipRow>) -> Result<Vec<Relationship>> {
    rows.into_iter().map(Relationship::try_from).collect()
}

/// Postgres-backed edge store. The unique constraint on
/// `(source_id, target_id, relationship_type)` closes the race between the
/// manager's pre-check and the insert.
#[derive(Clone)]
pub struct PgEdgeStore {
    pool: PgPool,
}

impl PgEdgeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn insert_edge<'e, E>(executor: E, edge: &Relationship) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO graph.relationships (
            id,
            source_id,
            target_id,
            relationship_type,
            direction,
            strength,
            status,
            description,
            created_at,
            updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(edge.id.0)
    .bind(edge.source_id.0)
    .bind(edge.target_id.0)
    .bind(edge.relationship_type.as_db_value())
    .bind(edge.direction.as_db_value())
    .bind(edge.strength.as_db_value())
    .bind(edge.status.as_db_value())
    .bind(&edge.description)
    .bind(edge.created_at)
    .bind(edge.updated_at)
    .execute(executor)
    .await
    .map_err(|err| db_err("Failed to create relationship", err))?;

    Ok(())
}

#[async_trait]
impl EdgeStore for PgEdgeStore {
    async fn insert(&self, edge: &Relationship) -> Result<()> {
        insert_edge(&self.pool, edge).await
    }

    async fn insert_pair(&self, forward: &Relationship, mirror: &Relationship) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| db_err("Failed to start transaction", err))?;

        insert_edge(&mut *tx, forward).await?;
        insert_edge(&mut *tx, mirror).await?;

        tx.commit()
            .await
            .map_err(|err| db_err("Failed to commit transaction", err))?;
        Ok(())
    }

    async fn fetch(&self, id: RelationshipId) -> Result<Option<Relationship>> {
        let row = sqlx::query_as::<_, RelationshipRow>(&format!(
            r#"
            SELECT {RELATIONSHIP_COLUMNS}
            FROM graph.relationships
            WHERE id = $1
            "#
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query relationship", err))?;

        row.map(Relationship::try_from).transpose()
    }

    async fn update(&self, edge: &Relationship) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE graph.relationships
            SET relationship_type = $1,
                strength = $2,
                status = $3,
                description = $4,
                updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(edge.relationship_type.as_db_value())
        .bind(edge.strength.as_db_value())
        .bind(edge.status.as_db_value())
        .bind(&edge.description)
        .bind(edge.updated_at)
        .bind(edge.id.0)
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to update relationship", err))?;

        Ok(())
    }

    async fn remove(&self, id: RelationshipId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM graph.relationships
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to delete relationship", err))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_triple(
        &self,
        source_id: NodeId,
        target_id: NodeId,
        relationship_type: RelationshipType,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM graph.relationships
            WHERE source_id = $1
              AND target_id = $2
              AND relationship_type = $3
            "#,
        )
        .bind(source_id.0)
        .bind(target_id.0)
        .bind(relationship_type.as_db_value())
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to delete relationship", err))?;

        Ok(result.rows_affected())
    }

    async fn remove_for_node(&self, node_id: NodeId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM graph.relationships
            WHERE source_id = $1
               OR target_id = $1
            "#,
        )
        .bind(node_id.0)
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to cascade delete relationships", err))?;

        Ok(result.rows_affected())
    }

    async fn triple_exists(
        &self,
        source_id: NodeId,
        target_id: NodeId,
        relationship_type: RelationshipType,
    ) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM graph.relationships
                WHERE source_id = $1
                  AND target_id = $2
                  AND relationship_type = $3
            )
            "#,
        )
        .bind(source_id.0)
        .bind(target_id.0)
        .bind(relationship_type.as_db_value())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query relationship", err))?;

        Ok(exists.0)
    }

    async fn find_triple(
        &self,
        source_id: NodeId,
        target_id: NodeId,
        relationship_type: RelationshipType,
    ) -> Result<Option<Relationship>> {
        let row = sqlx::query_as::<_, RelationshipRow>(&format!(
            r#"
            SELECT {RELATIONSHIP_COLUMNS}
            FROM graph.relationships
            WHERE source_id = $1
              AND target_id = $2
              AND relationship_type = $3
            "#
        ))
        .bind(source_id.0)
        .bind(target_id.0)
        .bind(relationship_type.as_db_value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query relationship", err))?;

        row.map(Relationship::try_from).transpose()
    }

    async fn outgoing(&self, node_id: NodeId) -> Result<Vec<Relationship>> {
        let rows = sqlx::query_as::<_, RelationshipRow>(&format!(
            r#"
            SELECT {RELATIONSHIP_COLUMNS}
            FROM graph.relationships
            WHERE source_id = $1
            ORDER BY seq ASC
            "#
        ))
        .bind(node_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query outgoing relationships", err))?;

        hydrate(rows)
    }

    async fn incoming(&self, node_id: NodeId) -> Result<Vec<Relationship>> {
        let rows = sqlx::query_as::<_, RelationshipRow>(&format!(
            r#"
            SELECT {RELATIONSHIP_COLUMNS}
            FROM graph.relationships
            WHERE target_id = $1
            ORDER BY seq ASC
            "#
        ))
        .bind(node_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query incoming relationships", err))?;

        hydrate(rows)
    }

    async fn list(
        &self,
        filter: &RelationshipFilter,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Relationship>> {
        let offset = (page.saturating_sub(1) as i64).saturating_mul(limit as i64);

        let rows = sqlx::query_as::<_, RelationshipRow>(&format!(
            r#"
            SELECT {RELATIONSHIP_COLUMNS}
            FROM graph.relationships
            WHERE ($1::uuid IS NULL OR source_id = $1)
              AND ($2::uuid IS NULL OR target_id = $2)
              AND ($3::text IS NULL OR relationship_type = $3)
              AND ($4::text IS NULL OR status = $4)
            ORDER BY created_at DESC, seq DESC
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(filter.source_id.map(|id| id.0))
        .bind(filter.target_id.map(|id| id.0))
        .bind(filter.relationship_type.map(|t| t.as_db_value()))
        .bind(filter.status.map(|s| s.as_db_value()))
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to list relationships", err))?;

        hydrate(rows)
    }

    async fn count(&self, filter: &RelationshipFilter) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM graph.relationships
            WHERE ($1::uuid IS NULL OR source_id = $1)
              AND ($2::uuid IS NULL OR target_id = $2)
              AND ($3::text IS NULL OR relationship_type = $3)
              AND ($4::text IS NULL OR status = $4)
            "#,
        )
        .bind(filter.source_id.map(|id| id.0))
        .bind(filter.target_id.map(|id| id.0))
        .bind(filter.relationship_type.map(|t| t.as_db_value()))
        .bind(filter.status.map(|s| s.as_db_value()))
        .fetch_one(&self.pool)
        .await
        .map_err(|err| db_err("Failed to count relationships", err))?;

        Ok(count.0)
    }
}

/// Node directory view over the collaborator's `graph.nodes` table.
#[derive(Clone)]
pub struct PgNodeDirectory {
    pool: PgPool,
}

impl PgNodeDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NodeDirectory for PgNodeDirectory {
    async fn node_exists(&self, id: NodeId) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM graph.nodes
                WHERE id = $1
            )
            "#,
        )
        .bind(id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query node", err))?;

        Ok(exists.0)
    }

    async fn node_name(&self, id: NodeId) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT name
            FROM graph.nodes
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query node", err))?;

        Ok(row.map(|(name,)| name))
    }
}
