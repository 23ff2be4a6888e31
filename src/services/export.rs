use futures::TryStreamExt;
use sqlx::PgPool;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::db::errors;
use crate::models::import_error::ImportErrorRecord;
use crate::services::storage::TempStore;

pub const EXPORT_HEADER: [&str; 5] = ["id", "row_num", "raw_data", "error_message", "created_at"];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Export file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode one CSV line. Fields containing separators, quotes or line breaks are
/// quoted with embedded quotes doubled.
fn encode_line<I, T>(fields: I) -> Result<Vec<u8>, ExportError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

fn encode_record(record: &ImportErrorRecord) -> Result<Vec<u8>, ExportError> {
    encode_line([
        record.id.to_string(),
        record.row_num.to_string(),
        record.raw_data.clone().unwrap_or_default(),
        record.error_message.clone(),
        record.created_at.to_rfc3339(),
    ])
}

/// Write every error of a job to a new CSV file in the store's directory.
///
/// The returned file belongs to the caller, who must delete it.
pub async fn export_errors_csv(
    pool: &PgPool,
    store: &TempStore,
    job_id: i64,
) -> Result<PathBuf, ExportError> {
    let path = store.export_path(job_id);

    match write_export(pool, job_id, &path).await {
        Ok(rows) => {
            tracing::info!(job_id, rows, path = %path.display(), "Exported import errors");
            Ok(path)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&path).await;
            Err(e)
        }
    }
}

async fn write_export(pool: &PgPool, job_id: i64, path: &std::path::Path) -> Result<u64, ExportError> {
    let file = tokio::fs::File::create(path).await?;
    let mut out = tokio::io::BufWriter::new(file);
    out.write_all(&encode_line(EXPORT_HEADER)?).await?;

    let mut rows = 0;
    let mut records = errors::stream_for_job(pool, job_id);
    while let Some(record) = records.try_next().await? {
        out.write_all(&encode_record(&record)?).await?;
        rows += 1;
    }

    out.flush().await?;
    Ok(rows)
}
