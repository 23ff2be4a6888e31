use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::db::{errors, jobs};
use crate::error::{ApiError, ApiResult};
use crate::models::import::{ErrorPageQuery, ImportSummary, SubmitResponse};
use crate::models::import_error::ErrorPage;
use crate::models::job::ImportJob;
use crate::services::export;
use crate::services::storage::{TempStore, TempUpload};

const DEFAULT_FILENAME: &str = "upload.csv";

/// Stream the `file` part of a multipart body into the temp store.
async fn receive_file(
    multipart: &mut Multipart,
    store: &TempStore,
) -> ApiResult<(String, TempUpload)> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string();

        let mut writer = store.begin_upload().await?;
        while let Some(chunk) = field.chunk().await? {
            writer.write_chunk(&chunk).await?;
        }
        let upload = writer.finish().await?;

        if upload.is_empty() {
            return Err(ApiError::EmptyFile);
        }
        return Ok((filename, upload));
    }

    Err(ApiError::MissingFilePart)
}

/// POST /imports: Accept a CSV for background import.
pub async fn submit_import(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let (filename, upload) = receive_file(&mut multipart, state.imports.store()).await?;
    let job_id = state.imports.submit(&filename, upload).await?;

    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

/// POST /imports/sync: Import a CSV inline and return the outcome.
pub async fn submit_import_sync(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImportSummary>> {
    let (filename, upload) = receive_file(&mut multipart, state.imports.store()).await?;
    let summary = state.imports.run_synchronously(&filename, upload).await?;

    Ok(Json(summary))
}

async fn require_job(state: &AppState, job_id: i64) -> ApiResult<ImportJob> {
    jobs::get_job(&state.db, job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Import job {job_id} not found")))
}

/// GET /imports/{job_id}: Poll an import job.
pub async fn get_import_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<ImportJob>> {
    Ok(Json(require_job(&state, job_id).await?))
}

/// GET /imports/{job_id}/errors: One page of a job's rejected rows.
pub async fn list_import_errors(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    Query(query): Query<ErrorPageQuery>,
) -> ApiResult<Json<ErrorPage>> {
    query
        .validate()
        .map_err(|report| ApiError::BadRequest(report.to_string()))?;
    require_job(&state, job_id).await?;

    let total_elements = errors::count_for_job(&state.db, job_id).await?;
    let items = errors::list_page(&state.db, job_id, query.page, query.size).await?;

    Ok(Json(ErrorPage {
        items,
        page: query.page,
        size: query.size,
        total_elements,
    }))
}

/// GET /imports/{job_id}/errors/csv: Download every rejected row as CSV.
pub async fn download_import_errors_csv(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    require_job(&state, job_id).await?;

    let path = export::export_errors_csv(&state.db, state.imports.store(), job_id).await?;
    let body = tokio::fs::read(&path).await;
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!(job_id, error = %e, "Failed to remove export file");
    }
    let body = body.map_err(|e| ApiError::Internal(format!("Could not read export: {e}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=import_errors_{job_id}.csv"),
            ),
        ],
        body,
    ))
}
