use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::models::job::{ImportJob, JobCounts, JobStatus};

const JOB_COLUMNS: &str = "id, filename, status, total_rows, success_count, failed_count, \
     inserted_count, failure_reason, created_at, started_at, finished_at";

fn job_from_row(row: &PgRow) -> Result<ImportJob, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str).map_err(|e| sqlx::Error::ColumnDecode {
        index: "status".to_string(),
        source: Box::new(e),
    })?;

    Ok(ImportJob {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        status,
        total_rows: row.try_get("total_rows")?,
        success_count: row.try_get("success_count")?,
        failed_count: row.try_get("failed_count")?,
        inserted_count: row.try_get("inserted_count")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

/// Insert a new PENDING import job
pub async fn create_job(pool: &PgPool, filename: &str) -> Result<ImportJob, sqlx::Error> {
    let row = sqlx::query(&format!(
        "INSERT INTO import_job (filename, status) VALUES ($1, 'PENDING') RETURNING {JOB_COLUMNS}"
    ))
    .bind(filename)
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Remember where the job's upload lives so a restarted process can find it.
pub async fn set_upload_path(pool: &PgPool, job_id: i64, path: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE import_job SET upload_path = $1 WHERE id = $2")
        .bind(path)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: i64) -> Result<Option<ImportJob>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM import_job WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Claim a PENDING job for processing. Returns false if another worker already
/// claimed it or it is no longer pending.
pub async fn mark_running(pool: &PgPool, job_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE import_job
        SET status = 'RUNNING', started_at = NOW()
        WHERE id = $1 AND status = 'PENDING'
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record the number of rows the bulk load staged.
pub async fn set_total_rows(pool: &PgPool, job_id: i64, total_rows: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE import_job SET total_rows = $1 WHERE id = $2 AND status = 'RUNNING'")
        .bind(total_rows)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Move a RUNNING job to SUCCESS or PARTIAL with its final counts.
///
/// Fails with [`sqlx::Error::RowNotFound`] when the job is not RUNNING.
pub async fn mark_completed(
    pool: &PgPool,
    job_id: i64,
    counts: &JobCounts,
) -> Result<JobStatus, sqlx::Error> {
    let status = JobStatus::for_completed(counts.failed_count);

    let result = sqlx::query(
        r#"
        UPDATE import_job
        SET status = $1,
            total_rows = $2,
            success_count = $3,
            failed_count = $4,
            inserted_count = $5,
            failure_reason = NULL,
            upload_path = NULL,
            finished_at = NOW()
        WHERE id = $6 AND status = 'RUNNING'
        "#,
    )
    .bind(status.as_str())
    .bind(counts.total_rows)
    .bind(counts.success_count)
    .bind(counts.failed_count)
    .bind(counts.inserted_count)
    .bind(job_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        tracing::warn!(job_id, "Job was not RUNNING, completion not recorded");
        return Err(sqlx::Error::RowNotFound);
    }

    Ok(status)
}

/// Move a non-terminal job to FAILED, keeping whatever totals are known.
pub async fn mark_failed(
    pool: &PgPool,
    job_id: i64,
    reason: &str,
    total_rows: Option<i64>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE import_job
        SET status = 'FAILED',
            failure_reason = $1,
            total_rows = COALESCE($2, total_rows),
            upload_path = NULL,
            finished_at = NOW()
        WHERE id = $3 AND status IN ('PENDING', 'RUNNING')
        "#,
    )
    .bind(reason)
    .bind(total_rows)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// A job a previous process left behind.
#[derive(Debug, Clone)]
pub struct UnfinishedJob {
    pub id: i64,
    pub status: JobStatus,
    pub upload_path: Option<String>,
}

/// Jobs still PENDING or RUNNING, oldest first.
pub async fn list_unfinished(pool: &PgPool) -> Result<Vec<UnfinishedJob>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, status, upload_path
        FROM import_job
        WHERE status IN ('PENDING', 'RUNNING')
        ORDER BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            let status_str: String = r.try_get("status")?;
            Ok(UnfinishedJob {
                id: r.try_get("id")?,
                status: JobStatus::from_str(&status_str).unwrap_or(JobStatus::Pending),
                upload_path: r.try_get("upload_path")?,
            })
        })
        .collect()
}
