//! HTTP error mapping.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::bulk_import::BulkImportError;
use crate::services::export::ExportError;
use crate::services::orchestrator::SubmitError;
use crate::services::pipeline::PipelineError;
use crate::services::queue::QueueError;
use crate::services::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Required multipart part 'file' is missing")]
    MissingFilePart,

    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("Invalid multipart body: {}", .0.body_text())]
    Multipart(#[from] MultipartError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    ImportFailed(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::MissingFilePart => (StatusCode::BAD_REQUEST, "MISSING_MULTIPART_PART"),
            ApiError::EmptyFile => (StatusCode::BAD_REQUEST, "EMPTY_FILE"),
            ApiError::Multipart(e) => (e.status(), "INVALID_MULTIPART"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ApiError::ImportFailed(_) => (StatusCode::UNPROCESSABLE_ENTITY, "IMPORT_FAILED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::EmptyUpload => ApiError::EmptyFile,
            SubmitError::Queue(e) => e.into(),
            SubmitError::Storage(e) => e.into(),
            SubmitError::Database(e) => e.into(),
            SubmitError::JobFailed {
                job_id,
                source: source @ (PipelineError::Load(_) | PipelineError::Malformed(_)),
            } => ApiError::ImportFailed(format!("Import job {job_id} failed: {source}")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        ApiError::Unavailable(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(format!("Database error: {err}"))
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<BulkImportError> for ApiError {
    fn from(err: BulkImportError) -> Self {
        match err {
            BulkImportError::Csv(e) => ApiError::BadRequest(format!("Malformed CSV: {e}")),
            BulkImportError::Database(e) => e.into(),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::MissingFilePart.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(QueueError::Full).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::NotFound("Import job 9 not found".to_string())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_empty_upload_maps_to_bad_request() {
        let err = ApiError::from(SubmitError::EmptyUpload);
        assert!(matches!(err, ApiError::EmptyFile));
    }

    #[test]
    fn test_rejected_value_maps_to_unprocessable() {
        let err = ApiError::from(SubmitError::JobFailed {
            job_id: 5,
            source: PipelineError::Malformed(sqlx::Error::RowNotFound),
        });
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_malformed_file_maps_to_unprocessable() {
        let err = ApiError::from(SubmitError::JobFailed {
            job_id: 4,
            source: PipelineError::Load(crate::db::staging::LoadError::Header(
                crate::models::recognition::HeaderError::Missing("sender_uuid"),
            )),
        });
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
