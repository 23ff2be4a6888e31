//! Shared setup for database-backed tests.
//!
//! Requires a PostgreSQL instance reachable through `DATABASE_URL`. Every test
//! seeds its own reference data with fresh uuids, so tests can share one
//! database and run in parallel.

#![allow(dead_code)]

use recognition_import::db::{self, jobs, staging};
use recognition_import::models::job::ImportJob;
use recognition_import::services::{
    orchestrator::ImportOrchestrator, pipeline::ImportPipeline, storage::TempStore,
    worker::WorkerPool,
};
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;
use uuid::Uuid;

pub const HEADER: &str = "external_uuid,type_uuid,award_name,level,recipient_uuid,sender_uuid,sent_at,message,award_points,approval_status,rejection_reason";

pub struct TestContext {
    pub pool: PgPool,
    pub imports: ImportOrchestrator,
    pub workers: WorkerPool,
    upload_dir: TempDir,
}

impl TestContext {
    pub fn upload_dir(&self) -> &Path {
        self.upload_dir.path()
    }

    /// Job-named uploads still on disk.
    pub fn job_uploads(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.upload_dir.path())
            .expect("upload dir readable")
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("import-") && !n.starts_with("import-errors-"))
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn upload_for(&self, job_id: i64) -> PathBuf {
        self.upload_dir.path().join(format!("import-{job_id}.csv"))
    }
}

pub async fn connect() -> PgPool {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for database tests");
    let pool = db::init_pool(&url).await.expect("Failed to connect to database");
    db::run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

pub async fn setup() -> TestContext {
    setup_with(2, 16).await
}

pub async fn setup_with(workers: usize, capacity: usize) -> TestContext {
    let pool = connect().await;
    let upload_dir = tempfile::tempdir().expect("Failed to create upload dir");
    let store = TempStore::new(upload_dir.path())
        .await
        .expect("Failed to create temp store");

    let pipeline = Arc::new(ImportPipeline::new(pool.clone()));
    let (queue, workers) = WorkerPool::start(pipeline.clone(), workers, capacity);
    let imports = ImportOrchestrator::new(pool.clone(), store, queue, pipeline);

    TestContext {
        pool,
        imports,
        workers,
        upload_dir,
    }
}

/// Reference rows created for one test.
#[derive(Debug, Clone)]
pub struct Fixtures {
    pub type_uuid: Uuid,
    pub alice: Uuid,
    pub bob: Uuid,
}

pub async fn seed_reference_data(pool: &PgPool) -> Fixtures {
    let fixtures = Fixtures {
        type_uuid: Uuid::new_v4(),
        alice: Uuid::new_v4(),
        bob: Uuid::new_v4(),
    };

    sqlx::query("INSERT INTO recognition_type (uuid, type_name) VALUES ($1, 'Shout-out')")
        .bind(fixtures.type_uuid)
        .execute(pool)
        .await
        .expect("Failed to seed recognition type");

    for (uuid, first_name) in [(fixtures.alice, "Alice"), (fixtures.bob, "Bob")] {
        sqlx::query("INSERT INTO employee (uuid, first_name, last_name) VALUES ($1, $2, 'Tester')")
            .bind(uuid)
            .bind(first_name)
            .execute(pool)
            .await
            .expect("Failed to seed employee");
    }

    fixtures
}

/// One CSV data line in canonical column order.
pub fn row(external: Uuid, type_uuid: &str, recipient: &str, sender: &str) -> String {
    format!(
        "{external},{type_uuid},Star Award,gold,{recipient},{sender},2024-03-01T09:30:00Z,\"Great work, \"\"really\"\"\",50,APPROVED,"
    )
}

pub fn valid_row(f: &Fixtures, external: Uuid) -> String {
    row(external, &f.type_uuid.to_string(), &f.alice.to_string(), &f.bob.to_string())
}

pub fn csv_file(rows: &[String]) -> Vec<u8> {
    let mut out = String::from(HEADER);
    out.push('\n');
    for r in rows {
        out.push_str(r);
        out.push('\n');
    }
    out.into_bytes()
}

/// Poll a job until it reaches a terminal status.
pub async fn wait_for_terminal(pool: &PgPool, job_id: i64) -> ImportJob {
    for _ in 0..600 {
        let job = jobs::get_job(pool, job_id)
            .await
            .expect("Failed to load job")
            .expect("Job not found");
        if job.status.is_terminal() {
            return job;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("Job {job_id} did not finish within 30 seconds");
}

pub async fn staged_rows(pool: &PgPool, job_id: i64) -> i64 {
    staging::count_for_job(pool, job_id)
        .await
        .expect("Failed to count staging rows")
}
