//! Job-tagged staging area for raw CSV rows.
//!
//! Rows reach `staging_recognitions` only through PostgreSQL `COPY ... FROM
//! STDIN`. The job tag is never part of the file: the load transaction sets
//! `import.job_id` locally and the column default reads it back. Every other
//! statement filters on `job_id`, so concurrent imports never see each other's
//! rows and the table is never truncated.

use sqlx::PgPool;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::models::recognition::{map_header, CsvColumn, HeaderError};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Invalid CSV header: {0}")]
    Header(#[from] HeaderError),

    #[error("Could not parse CSV header: {0}")]
    Csv(#[from] csv::Error),

    #[error("Could not read upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bulk load failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read the header line of an upload and map it onto staging columns.
pub async fn read_header(path: &Path) -> Result<Vec<CsvColumn>, LoadError> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    if line.trim().is_empty() {
        return Err(HeaderError::Empty.into());
    }

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line.as_bytes());
    let record = match csv_reader.records().next() {
        Some(record) => record?,
        None => return Err(HeaderError::Empty.into()),
    };

    Ok(map_header(record.iter())?)
}

pub(crate) fn copy_statement(columns: &[CsvColumn]) -> String {
    let column_list = columns
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    // Quoted empty cells load as NULL too, same as unquoted ones.
    format!(
        "COPY staging_recognitions ({column_list}) FROM STDIN WITH (FORMAT csv, HEADER true, ENCODING 'UTF8', FORCE_NULL ({column_list}))"
    )
}

/// Stream an uploaded CSV into the staging area for `job_id`.
///
/// The whole load is one transaction: a malformed file leaves no staged rows
/// behind. Returns the number of data rows staged.
pub async fn load_raw(pool: &PgPool, job_id: i64, path: &Path) -> Result<u64, LoadError> {
    let columns = read_header(path).await?;
    let statement = copy_statement(&columns);

    let mut tx = pool.begin().await?;

    sqlx::query("SELECT set_config('import.job_id', $1, true)")
        .bind(job_id.to_string())
        .execute(&mut *tx)
        .await?;

    let file = tokio::fs::File::open(path).await?;
    let mut copy = tx.copy_in_raw(&statement).await?;
    let streamed = copy.read_from(file).await.map(|_| ());
    if let Err(e) = streamed {
        tracing::warn!(job_id, error = %e, "Aborting COPY into staging");
        let _ = copy.abort(e.to_string()).await;
        return Err(e.into());
    }
    let rows = copy.finish().await?;

    // Ids are drawn from the sequence in COPY order, which is file order.
    sqlx::query(
        r#"
        UPDATE staging_recognitions s
        SET row_num = o.n
        FROM (
            SELECT id, row_number() OVER (ORDER BY id) AS n
            FROM staging_recognitions
            WHERE job_id = $1
        ) o
        WHERE s.id = o.id
        "#,
    )
    .bind(job_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(job_id, rows, "Staged upload");
    Ok(rows)
}

/// Delete every staged row of a job. Safe to call repeatedly.
pub async fn drain(pool: &PgPool, job_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM staging_recognitions WHERE job_id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Number of rows currently staged for a job
pub async fn count_for_job(pool: &PgPool, job_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM staging_recognitions WHERE job_id = $1")
        .bind(job_id)
        .fetch_one(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_copy_statement_follows_header_order() {
        let sql = copy_statement(&[CsvColumn::SenderUuid, CsvColumn::TypeUuid, CsvColumn::RecipientUuid]);
        assert_eq!(
            sql,
            "COPY staging_recognitions (sender_uuid, type_uuid, recipient_uuid) FROM STDIN WITH (FORMAT csv, HEADER true, ENCODING 'UTF8', FORCE_NULL (sender_uuid, type_uuid, recipient_uuid))"
        );
    }

    #[tokio::test]
    async fn test_read_header_of_upload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "\"type_uuid\",recipient_uuid,sender_uuid,sent_at").unwrap();
        writeln!(file, "a,b,c,2024-01-01T00:00:00Z").unwrap();

        let columns = read_header(file.path()).await.unwrap();
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[3], CsvColumn::SentAt);
    }

    #[tokio::test]
    async fn test_empty_upload_has_no_header() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = read_header(file.path()).await.unwrap_err();
        assert!(matches!(err, LoadError::Header(HeaderError::Empty)));
    }
}
