//! API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::api::AppState;
use crate::query::{QueryRequest, QueryResponse, QueryResult};
use crate::types::{DistanceMetric, Document};
use crate::Error;

type ApiError = (StatusCode, String);

fn api_error(err: Error) -> ApiError {
    let status = match err {
        Error::NamespaceNotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidVector(_) | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

/// Health check
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        namespaces: state.namespace_count(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub namespaces: usize,
}

/// Create namespace (idempotent for an identical layout)
pub async fn create_namespace(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Json(payload): Json<CreateNamespaceRequest>,
) -> Result<Json<CreateNamespaceResponse>, ApiError> {
    let created = state
        .create_namespace(&namespace, payload.dimension, payload.metric)
        .map_err(api_error)?;

    if created {
        tracing::info!(%namespace, dimension = payload.dimension, "Namespace created");
    }

    Ok(Json(CreateNamespaceResponse { namespace, created }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateNamespaceRequest {
    pub dimension: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateNamespaceResponse {
    pub namespace: String,
    pub created: bool,
}

/// Drop namespace
pub async fn drop_namespace(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.drop_namespace(&namespace).map_err(api_error)?;
    tracing::info!(%namespace, "Namespace dropped");
    Ok(StatusCode::NO_CONTENT)
}

/// Upsert vectors
pub async fn upsert(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Json(payload): Json<UpsertRequest>,
) -> Result<Json<UpsertResponse>, ApiError> {
    let store = state.get_namespace(&namespace).map_err(api_error)?;

    let count = payload.documents.len();
    for doc in payload.documents {
        store.upsert(doc.id, doc.vector).map_err(api_error)?;
    }

    Ok(Json(UpsertResponse { count }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpsertRequest {
    pub documents: Vec<Document>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpsertResponse {
    pub count: usize,
}

/// Query the k nearest vectors
pub async fn query(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let start = Instant::now();

    let store = state.get_namespace(&namespace).map_err(api_error)?;
    let results = store
        .search(&payload.vector, payload.top_k)
        .map_err(api_error)?
        .into_iter()
        .map(|(id, score)| QueryResult { id, score })
        .collect();

    let took_ms = start.elapsed().as_millis() as u64;

    Ok(Json(QueryResponse { results, took_ms }))
}
