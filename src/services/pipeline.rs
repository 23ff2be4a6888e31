//! Job state machine for one staged import.
//!
//! PENDING -> RUNNING -> SUCCESS | PARTIAL | FAILED. Whatever happens during
//! load and move, the job's staging rows are drained and its upload deleted
//! before the terminal status is written, so a caller that observes a terminal
//! job never sees leftovers.

use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::db::{jobs, mover, staging};
use crate::models::job::{JobCounts, JobStatus};
use crate::services::storage::TempUpload;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Job {0} is not pending and cannot be started")]
    NotClaimable(i64),

    #[error(transparent)]
    Load(#[from] staging::LoadError),

    #[error("Malformed value in upload: {0}")]
    Malformed(#[source] sqlx::Error),

    #[error("Validate/move failed: {0}")]
    Move(#[source] sqlx::Error),

    #[error("Import task for job {0} terminated unexpectedly")]
    Aborted(i64),

    #[error("Staged {staged} rows but accounted for {accounted}")]
    CountMismatch { staged: i64, accounted: i64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A job that reached SUCCESS or PARTIAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessedJob {
    pub job_id: i64,
    pub status: JobStatus,
    pub counts: JobCounts,
}

/// Runs the staging -> validate -> move protocol for single jobs.
#[derive(Debug, Clone)]
pub struct ImportPipeline {
    db: PgPool,
}

impl ImportPipeline {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Process one PENDING job to a terminal state.
    ///
    /// On error the job is already marked FAILED with the error as its
    /// failure reason.
    pub async fn process(&self, job_id: i64, upload: TempUpload) -> Result<ProcessedJob, PipelineError> {
        if !jobs::mark_running(&self.db, job_id).await? {
            tracing::warn!(job_id, "Job already claimed or finished, skipping");
            self.delete_upload(job_id, upload).await;
            return Err(PipelineError::NotClaimable(job_id));
        }

        tracing::info!(
            job_id,
            upload_bytes = upload.len(),
            "Processing import job"
        );
        let start = Instant::now();

        let mut total_rows = None;
        let result = self.execute(job_id, &upload, &mut total_rows).await;

        self.drain_staging(job_id).await;
        self.delete_upload(job_id, upload).await;

        metrics::histogram!("import_processing_seconds").record(start.elapsed().as_secs_f64());

        match result {
            Ok(counts) => {
                let status = match jobs::mark_completed(&self.db, job_id, &counts).await {
                    Ok(status) => status,
                    Err(e) => {
                        tracing::error!(job_id, error = %e, "Failed to record job completion");
                        let e = PipelineError::Database(e);
                        self.fail_job(job_id, &e.to_string(), Some(counts.total_rows)).await;
                        return Err(e);
                    }
                };

                metrics::counter!("import_jobs_completed_total", "status" => status.as_str())
                    .increment(1);
                metrics::counter!("import_rows_total", "outcome" => "resolved")
                    .increment(counts.success_count as u64);
                metrics::counter!("import_rows_total", "outcome" => "failed")
                    .increment(counts.failed_count as u64);

                tracing::info!(
                    job_id,
                    status = %status,
                    total_rows = counts.total_rows,
                    success_count = counts.success_count,
                    failed_count = counts.failed_count,
                    inserted_count = counts.inserted_count,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Import job finished"
                );

                Ok(ProcessedJob { job_id, status, counts })
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Import job failed");
                self.fail_job(job_id, &e.to_string(), total_rows).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        job_id: i64,
        upload: &TempUpload,
        total_rows: &mut Option<i64>,
    ) -> Result<JobCounts, PipelineError> {
        let staged = staging::load_raw(&self.db, job_id, upload.path()).await? as i64;
        *total_rows = Some(staged);
        jobs::set_total_rows(&self.db, job_id, staged).await?;

        let outcome = mover::resolve_and_move(&self.db, job_id)
            .await
            .map_err(|e| {
                if mover::is_data_error(&e) {
                    PipelineError::Malformed(e)
                } else {
                    PipelineError::Move(e)
                }
            })?;

        let accounted = outcome.resolved + outcome.failed;
        if accounted != staged {
            return Err(PipelineError::CountMismatch { staged, accounted });
        }

        Ok(JobCounts {
            total_rows: staged,
            success_count: outcome.resolved,
            failed_count: outcome.failed,
            inserted_count: outcome.inserted,
        })
    }

    /// Run [`ImportPipeline::process`] in its own task. If the job panics its
    /// staging rows are drained and it is marked FAILED.
    pub async fn process_isolated(
        self: &Arc<Self>,
        job_id: i64,
        upload: TempUpload,
    ) -> Result<ProcessedJob, PipelineError> {
        let pipeline = self.clone();
        self.guard(job_id, async move { pipeline.process(job_id, upload).await })
            .await
    }

    async fn guard<F>(&self, job_id: i64, job: F) -> Result<ProcessedJob, PipelineError>
    where
        F: Future<Output = Result<ProcessedJob, PipelineError>> + Send + 'static,
    {
        match tokio::spawn(job).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(job_id, error = %e, "Import task panicked");
                let err = PipelineError::Aborted(job_id);
                self.drain_staging(job_id).await;
                self.fail_job(job_id, &err.to_string(), None).await;
                Err(err)
            }
        }
    }

    /// Mark a job FAILED, keeping the known totals. Bookkeeping errors are
    /// logged, not returned.
    pub async fn fail_job(&self, job_id: i64, reason: &str, total_rows: Option<i64>) {
        metrics::counter!("import_jobs_completed_total", "status" => JobStatus::Failed.as_str())
            .increment(1);
        if let Err(e) = jobs::mark_failed(&self.db, job_id, reason, total_rows).await {
            tracing::error!(job_id, error = %e, "Failed to record job failure");
        }
    }

    pub async fn drain_staging(&self, job_id: i64) {
        match staging::drain(&self.db, job_id).await {
            Ok(0) => {}
            Ok(rows) => tracing::debug!(job_id, rows, "Drained leftover staging rows"),
            Err(e) => tracing::error!(job_id, error = %e, "Failed to drain staging rows"),
        }
    }

    async fn delete_upload(&self, job_id: i64, upload: TempUpload) {
        if let Err(e) = upload.delete().await {
            tracing::error!(job_id, error = %e, "Failed to delete upload");
        }
    }
}
