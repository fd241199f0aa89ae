//! Reference HTTP vector service
//!
//! Serves exact in-memory namespaces over the same API the HTTP store
//! client speaks, so a remote benchmark run can be exercised locally.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod handlers;
pub mod state;

pub use state::AppState;

/// Build the API router using the provided application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest(
            "/v1",
            Router::new()
                .route(
                    "/namespaces/:namespace",
                    put(handlers::create_namespace).delete(handlers::drop_namespace),
                )
                .route("/namespaces/:namespace/upsert", post(handlers::upsert))
                .route("/namespaces/:namespace/query", post(handlers::query)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
