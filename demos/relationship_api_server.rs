use std::env;
use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use depgraph::api::{AppError, RelationshipApp};
use depgraph::db::{PgEdgeStore, PgNodeDirectory};
use depgraph::error::LibError;
use depgraph::operations::RelationshipOperations;

#[derive(Clone)]
struct DemoApp {
    pool: PgPool,
    relationships: RelationshipOperations<PgEdgeStore, PgNodeDirectory>,
}

impl RelationshipApp for DemoApp {
    fn relationships(&self) -> &RelationshipOperations<PgEdgeStore, PgNodeDirectory> {
        &self.relationships
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let database_url = env::var("DATABASE_URL")
        .context("DATABASE_URL is required to run demos/relationship_api_server.rs")?;
    let bind = env::var("GRAPH_API_BIND").unwrap_or_else(|_| "127.0.0.1:4020".to_string());
    let bind_addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid GRAPH_API_BIND '{}'", bind))?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to postgres")?;

    depgraph::db::create_graph_tables(&pool)
        .await
        .context("failed to run relationship migrations")?;

    let relationships = RelationshipOperations::new(
        PgEdgeStore::new(pool.clone()),
        PgNodeDirectory::new(pool.clone()),
    );
    let app_state = DemoApp {
        pool,
        relationships,
    };

    let api_v1 = Router::new()
        .route("/healthz", get(health_handler))
        .route("/nodes", post(create_node_handler))
        .merge(depgraph::api::routes::<DemoApp>());

    let app = Router::new().nest("/api/v1", api_v1).with_state(app_state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", bind_addr))?;

    println!("depgraph demo server listening on http://{}", bind_addr);
    println!("api base path: /api/v1");
    println!("seed nodes with POST /api/v1/nodes {{\"name\": \"...\"}}");

    axum::serve(listener, app)
        .await
        .context("demo server failed")
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true
    }))
}

#[derive(Deserialize)]
struct CreateNodePayload {
    name: String,
}

/// Dev convenience only. Nodes belong to the upstream inventory in a real
/// deployment; the demo seeds them directly so the API can be exercised.
async fn create_node_handler(
    State(app): State<DemoApp>,
    Json(payload): Json<CreateNodePayload>,
) -> Result<impl IntoResponse, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError(LibError::invalid(
            "Node name must not be blank",
            anyhow::anyhow!("blank node name"),
        )));
    }

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO graph.nodes (id, name, created_at) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(name)
        .bind(Utc::now().naive_utc())
        .execute(&app.pool)
        .await
        .map_err(|err| {
            AppError(LibError::database(
                "Failed to create node",
                anyhow::anyhow!(err),
            ))
        })?;

    Ok((StatusCode::CREATED, Json(json!({ "id": id, "name": name }))))
}
