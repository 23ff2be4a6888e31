use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::import_error::ImportErrorRecord;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Query string of `GET /imports/{jobId}/errors`.
#[derive(Debug, Deserialize, Validate)]
pub struct ErrorPageQuery {
    #[garde(range(max = 1_000_000))]
    #[serde(default)]
    pub page: u32,

    #[garde(range(min = 1, max = MAX_PAGE_SIZE))]
    #[serde(default = "default_page_size")]
    pub size: u32,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Response after submitting a file for background import.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: i64,
}

/// Result of an import executed inline by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub job_id: i64,
    pub status: crate::models::job::JobStatus,
    pub total_rows: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub inserted_count: i64,
    pub errors: Vec<ImportErrorRecord>,
}

/// Result of the in-memory importer. Nothing about the upload is persisted
/// besides the inserted recognitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUploadResult {
    pub total_rows: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
}
