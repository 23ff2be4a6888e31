use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod health;
pub mod imports;
pub mod metrics;
pub mod recognitions;

/// API routes with the shared middleware stack.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/imports", post(imports::submit_import))
        .route("/imports/sync", post(imports::submit_import_sync))
        .route("/imports/{job_id}", get(imports::get_import_job))
        .route("/imports/{job_id}/errors", get(imports::list_import_errors))
        .route(
            "/imports/{job_id}/errors/csv",
            get(imports::download_import_errors_csv),
        )
        .route("/recognitions/bulk-upload", post(recognitions::bulk_upload))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
}
