use futures::stream::BoxStream;
use futures::TryStreamExt;
use sqlx::PgPool;

use crate::models::import_error::ImportErrorRecord;

/// Number of error-ledger rows recorded for a job
pub async fn count_for_job(pool: &PgPool, job_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM import_error WHERE import_job_id = $1")
        .bind(job_id)
        .fetch_one(pool)
        .await
}

/// One offset page of a job's errors, ordered by id.
pub async fn list_page(
    pool: &PgPool,
    job_id: i64,
    page: u32,
    size: u32,
) -> Result<Vec<ImportErrorRecord>, sqlx::Error> {
    let offset = i64::from(page) * i64::from(size);

    sqlx::query_as::<_, ImportErrorRecord>(
        r#"
        SELECT id, row_num, raw_data, error_message, created_at
        FROM import_error
        WHERE import_job_id = $1
        ORDER BY id ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(job_id)
    .bind(i64::from(size))
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Every error of a job, ordered by id
pub async fn list_all(pool: &PgPool, job_id: i64) -> Result<Vec<ImportErrorRecord>, sqlx::Error> {
    stream_for_job(pool, job_id).try_collect().await
}

/// Stream every error of a job in id order without buffering the whole ledger.
pub fn stream_for_job(
    pool: &PgPool,
    job_id: i64,
) -> BoxStream<'_, Result<ImportErrorRecord, sqlx::Error>> {
    sqlx::query_as::<_, ImportErrorRecord>(
        r#"
        SELECT id, row_num, raw_data, error_message, created_at
        FROM import_error
        WHERE import_job_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(job_id)
    .fetch(pool)
}
