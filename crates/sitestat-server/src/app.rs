use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// `TraceLayer` logs every request through `tracing`; the permissive
/// `CorsLayer` lets dashboards on other origins read `/stats`.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/ingest", post(routes::ingest::ingest))
        .route("/api/ingest", post(routes::ingest::ingest))
        .route("/stats", get(routes::stats::stats))
        .route("/api/stats/{domain}", get(routes::stats::domain_stats))
        .route("/api/classify", post(routes::classify::classify))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
