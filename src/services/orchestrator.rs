use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;

use crate::db::{errors, jobs};
use crate::models::import::ImportSummary;
use crate::models::job::JobStatus;
use crate::services::pipeline::{ImportPipeline, PipelineError};
use crate::services::queue::{ImportQueue, ImportTask, QueueError};
use crate::services::storage::{StorageError, TempStore, TempUpload};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Import job {job_id} failed: {source}")]
    JobFailed {
        job_id: i64,
        #[source]
        source: PipelineError,
    },
}

/// Entry point for staged imports, background or inline.
#[derive(Debug, Clone)]
pub struct ImportOrchestrator {
    db: PgPool,
    store: TempStore,
    queue: ImportQueue,
    pipeline: Arc<ImportPipeline>,
}

impl ImportOrchestrator {
    pub fn new(
        db: PgPool,
        store: TempStore,
        queue: ImportQueue,
        pipeline: Arc<ImportPipeline>,
    ) -> Self {
        Self {
            db,
            store,
            queue,
            pipeline,
        }
    }

    pub fn store(&self) -> &TempStore {
        &self.store
    }

    pub fn queue(&self) -> &ImportQueue {
        &self.queue
    }

    /// Create a PENDING job for a received upload and queue it. Returns as soon
    /// as the job exists and the upload is on disk.
    pub async fn submit(&self, filename: &str, upload: TempUpload) -> Result<i64, SubmitError> {
        if upload.is_empty() {
            return Err(SubmitError::EmptyUpload);
        }

        let slot = self.queue.reserve()?;
        let job_id = self.create_job(filename, upload).await.map(|(job_id, upload)| {
            slot.enqueue(ImportTask { job_id, upload });
            job_id
        })?;

        metrics::counter!("import_jobs_submitted_total").increment(1);
        metrics::gauge!("import_queue_depth").set(self.queue.depth() as f64);
        tracing::info!(job_id, filename, "Import submitted");

        Ok(job_id)
    }

    pub async fn submit_bytes(&self, filename: &str, data: &[u8]) -> Result<i64, SubmitError> {
        let upload = self.store.persist_bytes(data).await?;
        self.submit(filename, upload).await
    }

    /// Run the whole import inline. Job and error-ledger bookkeeping is the
    /// same as for [`ImportOrchestrator::submit`].
    pub async fn run_synchronously(
        &self,
        filename: &str,
        upload: TempUpload,
    ) -> Result<ImportSummary, SubmitError> {
        if upload.is_empty() {
            return Err(SubmitError::EmptyUpload);
        }

        let (job_id, upload) = self.create_job(filename, upload).await?;
        metrics::counter!("import_jobs_submitted_total").increment(1);
        tracing::info!(job_id, filename, "Running import inline");

        let processed = self
            .pipeline
            .process_isolated(job_id, upload)
            .await
            .map_err(|source| SubmitError::JobFailed { job_id, source })?;

        let errors = errors::list_all(&self.db, job_id).await?;

        Ok(ImportSummary {
            job_id,
            status: processed.status,
            total_rows: processed.counts.total_rows,
            success_count: processed.counts.success_count,
            failed_count: processed.counts.failed_count,
            inserted_count: processed.counts.inserted_count,
            errors,
        })
    }

    pub async fn run_bytes_synchronously(
        &self,
        filename: &str,
        data: &[u8],
    ) -> Result<ImportSummary, SubmitError> {
        let upload = self.store.persist_bytes(data).await?;
        self.run_synchronously(filename, upload).await
    }

    async fn create_job(
        &self,
        filename: &str,
        upload: TempUpload,
    ) -> Result<(i64, TempUpload), SubmitError> {
        let job = jobs::create_job(&self.db, filename).await?;

        let upload = match self.store.assign(upload, job.id).await {
            Ok(upload) => upload,
            Err(e) => {
                self.pipeline
                    .fail_job(job.id, &format!("could not store upload: {e}"), None)
                    .await;
                return Err(e.into());
            }
        };

        let path = upload.path().to_string_lossy().into_owned();
        if let Err(e) = jobs::set_upload_path(&self.db, job.id, &path).await {
            self.pipeline
                .fail_job(job.id, &format!("could not record upload: {e}"), None)
                .await;
            return Err(e.into());
        }

        Ok((job.id, upload))
    }

    /// Settle jobs a previous process left unfinished.
    ///
    /// RUNNING jobs cannot be resumed and are failed. PENDING jobs are queued
    /// again when their upload survived, failed otherwise. Returns the number
    /// of jobs queued again.
    pub async fn recover(&self) -> Result<usize, SubmitError> {
        let mut requeued = 0;

        for job in jobs::list_unfinished(&self.db).await? {
            match job.status {
                JobStatus::Running => {
                    self.pipeline.drain_staging(job.id).await;
                    self.pipeline
                        .fail_job(job.id, "interrupted by restart", None)
                        .await;
                    if let Some(path) = job.upload_path.as_deref() {
                        remove_stale_upload(job.id, Path::new(path)).await;
                    }
                    tracing::warn!(job_id = job.id, "Failed job interrupted by restart");
                }
                _ => {
                    let upload = match job.upload_path.as_deref() {
                        Some(path) => self.store.adopt(path).await.ok(),
                        None => None,
                    };
                    match upload {
                        Some(upload) => {
                            let slot = self.queue.reserve_wait().await?;
                            slot.enqueue(ImportTask { job_id: job.id, upload });
                            requeued += 1;
                            tracing::info!(job_id = job.id, "Re-queued pending import");
                        }
                        None => {
                            self.pipeline
                                .fail_job(job.id, "upload lost before processing", None)
                                .await;
                            tracing::warn!(job_id = job.id, "Failed pending import without upload");
                        }
                    }
                }
            }
        }

        Ok(requeued)
    }
}

async fn remove_stale_upload(job_id: i64, path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(job_id, error = %e, "Failed to remove stale upload"),
    }
}
