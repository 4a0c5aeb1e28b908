use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::handlers::{job, submit, AppState};
use crate::services::QueryService;

/// Create router with application state
pub fn create_router(query_service: Arc<QueryService>) -> Router {
    let state = AppState::new(query_service);

    Router::new()
        .route("/health", get(health_check))
        .route("/async", post(submit::create_async_query))
        .route("/sync", post(submit::create_sync_query))
        .route("/async/{id}", get(job::get_job))
        .route("/async/{id}/phase", get(job::get_phase))
        .route("/async/{id}/parameters", get(job::get_parameters))
        .route("/async/{id}/error", get(job::get_error))
        .route("/async/{id}/results/result", get(job::get_result))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
