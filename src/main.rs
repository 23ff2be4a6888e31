use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use recognition_import::app_state::AppState;
use recognition_import::config::AppConfig;
use recognition_import::db;
use recognition_import::routes::{self, metrics::MetricsState};
use recognition_import::services::{
    orchestrator::ImportOrchestrator, pipeline::ImportPipeline, storage::TempStore,
    worker::WorkerPool,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing recognition-import server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!(
        "import_jobs_submitted_total",
        "Total import jobs submitted"
    );
    metrics::describe_counter!(
        "import_jobs_completed_total",
        "Import jobs reaching a terminal status, by status"
    );
    metrics::describe_counter!(
        "import_rows_total",
        "Imported rows by outcome (resolved or failed)"
    );
    metrics::describe_histogram!(
        "import_processing_seconds",
        "Time to stage, validate and move one import job"
    );
    metrics::describe_gauge!(
        "import_queue_depth",
        "Imports waiting for a worker"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!(upload_dir = %config.upload_dir.display(), "Preparing upload directory");
    let store = TempStore::new(&config.upload_dir)
        .await
        .expect("Failed to create upload directory");

    // Start import workers
    let pipeline = Arc::new(ImportPipeline::new(db_pool.clone()));
    let (queue, workers) = WorkerPool::start(
        pipeline.clone(),
        config.import_workers,
        config.import_queue_capacity,
    );

    let imports = ImportOrchestrator::new(db_pool.clone(), store, queue.clone(), pipeline);

    match imports.recover().await {
        Ok(requeued) => tracing::info!(requeued, "Recovered unfinished imports"),
        Err(e) => tracing::error!(error = %e, "Failed to recover unfinished imports"),
    }

    let state = AppState::new(db_pool, imports);

    let app = routes::router(state, config.max_upload_bytes).route(
        "/metrics",
        axum::routing::get(routes::metrics::prometheus_metrics).with_state(MetricsState {
            handle: prometheus_handle,
            queue,
        }),
    );

    tracing::info!("Starting recognition-import on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("HTTP server stopped, finishing queued imports");
    workers.shutdown().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
