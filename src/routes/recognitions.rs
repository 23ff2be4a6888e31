use axum::extract::{Multipart, State};
use axum::Json;

use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::import::BulkUploadResult;

/// POST /recognitions/bulk-upload: Import a small CSV in memory.
///
/// No job is recorded; row failures are only reported in the response.
pub async fn bulk_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<BulkUploadResult>> {
    let mut data = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            data = Some(field.bytes().await?);
            break;
        }
    }

    let data = data.ok_or(ApiError::MissingFilePart)?;
    if data.is_empty() {
        return Err(ApiError::EmptyFile);
    }

    Ok(Json(state.bulk.import(&data).await?))
}
