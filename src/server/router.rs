//! HTTP router and handlers
//!
//! Thin JSON endpoints over [`CatalogService`]. Handlers never touch
//! authentication directly; the middleware has already opened a scope
//! with the verified claims by the time they run.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;

use super::middleware::{JwtVerifier, jwt_middleware};
use crate::catalog::CatalogService;
use crate::catalog::types::SearchScope;
use crate::error::Error;

/// Shared application state
pub struct AppState {
    /// Catalog facade
    pub catalog: Arc<CatalogService>,
    /// Token verifier used by the auth middleware
    pub verifier: Arc<JwtVerifier>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let verifier = Arc::clone(&state.verifier);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/search", post(search_handler))
        .route("/api/buckets", get(buckets_handler))
        .route("/api/packages", get(packages_handler))
        .route("/api/packages/browse", post(browse_handler))
        .route("/api/graphql", post(graphql_handler))
        // Authentication middleware (applied before other layers)
        .layer(middleware::from_fn_with_state(verifier, jwt_middleware))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    scope: SearchScope,
    #[serde(default)]
    bucket: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BrowseRequest {
    name: String,
    registry: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlRequest {
    query: String,
    #[serde(default)]
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct PackagesQuery {
    registry: String,
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /api/search
async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Response {
    match state
        .catalog
        .search(&req.query, req.scope, req.bucket.as_deref())
        .await
    {
        Ok(results) => Json(results).into_response(),
        Err(err) => error_response(&err),
    }
}

/// GET /api/buckets
async fn buckets_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.catalog.list_buckets().await {
        Ok(buckets) => Json(json!({ "buckets": buckets })).into_response(),
        Err(err) => error_response(&err),
    }
}

/// GET /api/packages?registry=...
async fn packages_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PackagesQuery>,
) -> Response {
    match state.catalog.list_packages(&query.registry).await {
        Ok(packages) => Json(json!({ "packages": packages })).into_response(),
        Err(err) => error_response(&err),
    }
}

/// POST /api/packages/browse
async fn browse_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BrowseRequest>,
) -> Response {
    match state.catalog.browse_package(&req.name, &req.registry).await {
        Ok(contents) => Json(contents).into_response(),
        Err(err) => error_response(&err),
    }
}

/// POST /api/graphql
async fn graphql_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GraphQlRequest>,
) -> Response {
    match state.catalog.execute_graphql(&req.query, req.variables).await {
        Ok(data) => Json(json!({ "data": data })).into_response(),
        Err(err) => error_response(&err),
    }
}

/// Map an error onto its HTTP status with a structured JSON body.
fn error_response(err: &Error) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        error!(kind = err.kind(), error = %err, "request failed");
    }
    (
        status,
        Json(json!({
            "error": {
                "kind": err.kind(),
                "message": err.to_string(),
                "remediation": err.remediation(),
            }
        })),
    )
        .into_response()
}
