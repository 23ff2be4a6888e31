use sqlx::PgPool;
use std::sync::Arc;

use crate::services::{bulk_import::BulkImporter, orchestrator::ImportOrchestrator};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub imports: Arc<ImportOrchestrator>,
    pub bulk: Arc<BulkImporter>,
}

impl AppState {
    pub fn new(db: PgPool, imports: ImportOrchestrator) -> Self {
        Self {
            bulk: Arc::new(BulkImporter::new(db.clone())),
            db,
            imports: Arc::new(imports),
        }
    }
}
