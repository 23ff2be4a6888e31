//! In-memory importer for small uploads.
//!
//! Parses the whole CSV, resolves natural keys with one lookup per reference
//! type and inserts in fixed-size chunks. Nothing besides the recognitions is
//! persisted: no job, no error ledger.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::db::recognitions::{self, NewRecognition};
use crate::models::import::BulkUploadResult;
use crate::models::import_error::ErrorCause;
use crate::models::recognition::CsvRecognitionRow;

pub const BATCH_SIZE: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum BulkImportError {
    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct BulkImporter {
    db: PgPool,
}

impl BulkImporter {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn import(&self, data: &[u8]) -> Result<BulkUploadResult, BulkImportError> {
        let rows = parse_rows(data)?;
        let mut result = BulkUploadResult {
            total_rows: rows.len(),
            ..Default::default()
        };

        let mut type_keys = HashSet::new();
        let mut employee_keys = HashSet::new();
        for row in &rows {
            type_keys.extend(parse_key(row.type_uuid.as_deref()));
            employee_keys.extend(parse_key(row.recipient_uuid.as_deref()));
            employee_keys.extend(parse_key(row.sender_uuid.as_deref()));
        }

        let type_keys: Vec<Uuid> = type_keys.into_iter().collect();
        let employee_keys: Vec<Uuid> = employee_keys.into_iter().collect();
        let types = recognitions::find_type_ids(&self.db, &type_keys).await?;
        let employees = recognitions::find_employee_ids(&self.db, &employee_keys).await?;

        let mut batch = Vec::with_capacity(BATCH_SIZE);
        for (index, row) in rows.iter().enumerate() {
            match resolve_row(row, &types, &employees) {
                Ok(recognition) => batch.push(recognition),
                Err(reason) => {
                    result.failed_count += 1;
                    result.errors.push(format!("row {}: {}", index + 1, reason));
                }
            }

            if batch.len() >= BATCH_SIZE {
                recognitions::insert_batch(&self.db, &batch).await?;
                result.success_count += batch.len();
                batch.clear();
            }
        }

        if !batch.is_empty() {
            recognitions::insert_batch(&self.db, &batch).await?;
            result.success_count += batch.len();
        }

        tracing::info!(
            total_rows = result.total_rows,
            success_count = result.success_count,
            failed_count = result.failed_count,
            "In-memory bulk upload finished"
        );

        Ok(result)
    }
}

pub(crate) fn parse_rows(data: &[u8]) -> Result<Vec<CsvRecognitionRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    reader.deserialize().collect()
}

fn parse_key(value: Option<&str>) -> Option<Uuid> {
    value.and_then(|v| Uuid::parse_str(v).ok())
}

fn lookup(value: Option<&str>, ids: &HashMap<Uuid, i64>) -> Option<i64> {
    parse_key(value).and_then(|key| ids.get(&key).copied())
}

/// Resolve one parsed row, reporting the first problem found. Reference
/// problems follow the staged importer's precedence: type, recipient, sender.
pub(crate) fn resolve_row(
    row: &CsvRecognitionRow,
    types: &HashMap<Uuid, i64>,
    employees: &HashMap<Uuid, i64>,
) -> Result<NewRecognition, String> {
    let type_id = lookup(row.type_uuid.as_deref(), types);
    let recipient_id = lookup(row.recipient_uuid.as_deref(), employees);
    let sender_id = lookup(row.sender_uuid.as_deref(), employees);

    let (recognition_type_id, recipient_id, sender_id) = match (type_id, recipient_id, sender_id) {
        (Some(t), Some(r), Some(s)) => (t, r, s),
        (t, r, s) => {
            let cause = ErrorCause::classify(t.is_some(), r.is_some(), s.is_some())
                .unwrap_or(ErrorCause::Unknown);
            return Err(cause.to_string());
        }
    };

    let uuid = match row.external_uuid.as_deref() {
        Some(raw) => Uuid::parse_str(raw).map_err(|_| format!("invalid external_uuid '{raw}'"))?,
        None => Uuid::new_v4(),
    };

    let sent_at = row
        .sent_at
        .as_deref()
        .map(|raw| parse_timestamp(raw).ok_or_else(|| format!("invalid sent_at '{raw}'")))
        .transpose()?;

    let award_points = row
        .award_points
        .as_deref()
        .map(|raw| {
            raw.parse::<i32>()
                .map_err(|_| format!("invalid award_points '{raw}'"))
        })
        .transpose()?;

    Ok(NewRecognition {
        uuid,
        recognition_type_id,
        award_name: row.award_name.clone(),
        level: row.level.clone(),
        recipient_id,
        sender_id,
        sent_at,
        message: row.message.clone(),
        award_points,
        approval_status: row
            .approval_status
            .clone()
            .unwrap_or_else(|| "PENDING".to_string()),
        rejection_reason: row.rejection_reason.clone(),
    })
}

/// Parse the timestamp forms PostgreSQL accepts for `sent_at` in the staged
/// path: ISO-8601 with `T` or a space, with or without an offset, or a bare
/// date. Values without an offset are UTC, the session zone sqlx connects with.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let iso = raw.replacen(' ', "T", 1);

    if let Ok(dt) = DateTime::parse_from_rfc3339(&iso) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(&iso, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&iso, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
