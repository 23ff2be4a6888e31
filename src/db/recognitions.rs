use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// A recognition whose references are already resolved to surrogate ids.
#[derive(Debug, Clone)]
pub struct NewRecognition {
    pub uuid: Uuid,
    pub recognition_type_id: i64,
    pub award_name: Option<String>,
    pub level: Option<String>,
    pub recipient_id: i64,
    pub sender_id: i64,
    pub sent_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub award_points: Option<i32>,
    pub approval_status: String,
    pub rejection_reason: Option<String>,
}

/// Resolve recognition type uuids to ids in one query. Unknown uuids are absent.
pub async fn find_type_ids(pool: &PgPool, uuids: &[Uuid]) -> Result<HashMap<Uuid, i64>, sqlx::Error> {
    id_map(pool, "SELECT uuid, id FROM recognition_type WHERE uuid = ANY($1)", uuids).await
}

/// Resolve employee uuids to ids in one query. Unknown uuids are absent.
pub async fn find_employee_ids(
    pool: &PgPool,
    uuids: &[Uuid],
) -> Result<HashMap<Uuid, i64>, sqlx::Error> {
    id_map(pool, "SELECT uuid, id FROM employee WHERE uuid = ANY($1)", uuids).await
}

async fn id_map(
    pool: &PgPool,
    sql: &'static str,
    uuids: &[Uuid],
) -> Result<HashMap<Uuid, i64>, sqlx::Error> {
    if uuids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query(sql).bind(uuids).fetch_all(pool).await?;
    rows.into_iter()
        .map(|r| Ok((r.try_get("uuid")?, r.try_get("id")?)))
        .collect()
}

/// Insert a batch of recognitions in one statement. Rows whose uuid already
/// exists are skipped. Returns the number of rows written.
pub async fn insert_batch(pool: &PgPool, batch: &[NewRecognition]) -> Result<u64, sqlx::Error> {
    if batch.is_empty() {
        return Ok(0);
    }

    let uuids: Vec<Uuid> = batch.iter().map(|r| r.uuid).collect();
    let type_ids: Vec<i64> = batch.iter().map(|r| r.recognition_type_id).collect();
    let award_names: Vec<Option<String>> = batch.iter().map(|r| r.award_name.clone()).collect();
    let levels: Vec<Option<String>> = batch.iter().map(|r| r.level.clone()).collect();
    let recipient_ids: Vec<i64> = batch.iter().map(|r| r.recipient_id).collect();
    let sender_ids: Vec<i64> = batch.iter().map(|r| r.sender_id).collect();
    let sent_ats: Vec<Option<DateTime<Utc>>> = batch.iter().map(|r| r.sent_at).collect();
    let messages: Vec<Option<String>> = batch.iter().map(|r| r.message.clone()).collect();
    let points: Vec<Option<i32>> = batch.iter().map(|r| r.award_points).collect();
    let statuses: Vec<String> = batch.iter().map(|r| r.approval_status.clone()).collect();
    let reasons: Vec<Option<String>> = batch.iter().map(|r| r.rejection_reason.clone()).collect();

    let result = sqlx::query(
        r#"
        INSERT INTO recognitions (uuid, recognition_type_id, award_name, level, recipient_id,
                                  sender_id, sent_at, message, award_points, approval_status,
                                  rejection_reason)
        SELECT * FROM UNNEST($1::uuid[], $2::bigint[], $3::text[], $4::text[], $5::bigint[],
                             $6::bigint[], $7::timestamptz[], $8::text[], $9::int4[], $10::text[],
                             $11::text[])
        ON CONFLICT (uuid) DO NOTHING
        "#,
    )
    .bind(&uuids)
    .bind(&type_ids)
    .bind(&award_names)
    .bind(&levels)
    .bind(&recipient_ids)
    .bind(&sender_ids)
    .bind(&sent_ats)
    .bind(&messages)
    .bind(&points)
    .bind(&statuses)
    .bind(&reasons)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Number of production rows carrying any of the given uuids
pub async fn count_by_uuids(pool: &PgPool, uuids: &[Uuid]) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM recognitions WHERE uuid = ANY($1)")
        .bind(uuids)
        .fetch_one(pool)
        .await
}
