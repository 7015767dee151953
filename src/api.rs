use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;

use crate::db::{PgEdgeStore, PgNodeDirectory};
use crate::error::{ErrorKind, LibError};
use crate::models::{
    CreateRelationshipPayload, ListRelationshipsQuery, NodeId, RelationshipId, TraverseQuery,
    UpdateRelationshipPayload,
};
use crate::operations::RelationshipOperations;

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!(
            kind = ?self.0.kind,
            code = self.0.code,
            error = %self.0.source,
            "relationship api request failed"
        );
        (status, Json(json!({ "code": self.0.code, "message": self.0.public }))).into_response()
    }
}

pub trait RelationshipApp {
    fn relationships(&self) -> &RelationshipOperations<PgEdgeStore, PgNodeDirectory>;
}

async fn create_relationship_handler<S>(
    State(app): State<S>,
    Json(payload): Json<CreateRelationshipPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: RelationshipApp + Clone + Send + Sync + 'static,
{
    let relationship = app.relationships().create_relationship(payload).await?;
    Ok((StatusCode::CREATED, Json(relationship)))
}

async fn list_relationships_handler<S>(
    State(app): State<S>,
    Query(query): Query<ListRelationshipsQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: RelationshipApp + Clone + Send + Sync + 'static,
{
    let page = app.relationships().list_relationships(query).await?;
    Ok(Json(page))
}

async fn get_relationship_handler<S>(
    State(app): State<S>,
    Path(relationship_id): Path<RelationshipId>,
) -> Result<impl IntoResponse, AppError>
where
    S: RelationshipApp + Clone + Send + Sync + 'static,
{
    let relationship = app.relationships().get_relationship(relationship_id).await?;
    Ok(Json(relationship))
}

async fn update_relationship_handler<S>(
    State(app): State<S>,
    Path(relationship_id): Path<RelationshipId>,
    Json(payload): Json<UpdateRelationshipPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: RelationshipApp + Clone + Send + Sync + 'static,
{
    let relationship = app
        .relationships()
        .update_relationship(relationship_id, payload)
        .await?;
    Ok(Json(relationship))
}

async fn delete_relationship_handler<S>(
    State(app): State<S>,
    Path(relationship_id): Path<RelationshipId>,
) -> Result<impl IntoResponse, AppError>
where
    S: RelationshipApp + Clone + Send + Sync + 'static,
{
    app.relationships()
        .delete_relationship(relationship_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn node_relationships_handler<S>(
    State(app): State<S>,
    Path(node_id): Path<NodeId>,
) -> Result<impl IntoResponse, AppError>
where
    S: RelationshipApp + Clone + Send + Sync + 'static,
{
    let summary = app.relationships().node_relationships(node_id).await?;
    Ok(Json(summary))
}

async fn delete_node_relationships_handler<S>(
    State(app): State<S>,
    Path(node_id): Path<NodeId>,
) -> Result<impl IntoResponse, AppError>
where
    S: RelationshipApp + Clone + Send + Sync + 'static,
{
    let removed = app.relationships().delete_all_for_node(node_id).await?;
    Ok(Json(json!({ "removed": removed })))
}

async fn detect_cycle_handler<S>(
    State(app): State<S>,
    Path(node_id): Path<NodeId>,
) -> Result<impl IntoResponse, AppError>
where
    S: RelationshipApp + Clone + Send + Sync + 'static,
{
    let result = app.relationships().detect_cycle(node_id).await?;
    Ok(Json(result))
}

async fn traverse_handler<S>(
    State(app): State<S>,
    Path(node_id): Path<NodeId>,
    Query(query): Query<TraverseQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: RelationshipApp + Clone + Send + Sync + 'static,
{
    let traversal = app.relationships().traverse(node_id, query).await?;
    Ok(Json(traversal))
}

pub fn routes<S>() -> Router<S>
where
    S: RelationshipApp + Clone + Send + Sync + 'static,
{
    tracing::info!("Registering route /relationships [GET,POST]");
    tracing::info!("Registering route /relationships/{{relationship_id}} [GET,PUT,DELETE]");
    tracing::info!("Registering route /nodes/{{node_id}}/relationships [GET,DELETE]");
    tracing::info!("Registering route /nodes/{{node_id}}/cycle [GET]");
    tracing::info!("Registering route /nodes/{{node_id}}/traverse [GET]");

    Router::new()
        .route(
            "/relationships",
            get(list_relationships_handler::<S>).post(create_relationship_handler::<S>),
        )
        .route(
            "/relationships/{relationship_id}",
            get(get_relationship_handler::<S>)
                .put(update_relationship_handler::<S>)
                .delete(delete_relationship_handler::<S>),
        )
        .route(
            "/nodes/{node_id}/relationships",
            get(node_relationships_handler::<S>).delete(delete_node_relationships_handler::<S>),
        )
        .route("/nodes/{node_id}/cycle", get(detect_cycle_handler::<S>))
        .route("/nodes/{node_id}/traverse", get(traverse_handler::<S>))
}
