//! Set-based validation of staged rows and their move into `recognitions`.

use sqlx::PgPool;

use crate::models::import_error::ErrorCause;

/// Attempts for one move when the statement loses a lock race.
const MAX_ATTEMPTS: u32 = 3;

/// SQLSTATEs after which re-running the whole statement is safe.
const RETRYABLE: [&str; 2] = ["40001", "40P01"];

/// The whole validate/move pass as one statement, so every part of it sees the
/// same snapshot under READ COMMITTED.
///
/// `staged` normalizes the job's rows: blank or whitespace-only cells become
/// NULL, and a reference that is not a well-formed uuid never resolves.
/// `failed` and `inserted` partition the rows, `drained` clears the job's
/// staging rows.
const MOVE_SQL: &str = r#"
    WITH staged AS (
        SELECT s.*,
               CASE WHEN lower(btrim(s.type_uuid)) ~ '^[0-9a-f]{8}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{12}$'
                    THEN lower(btrim(s.type_uuid))::uuid END AS type_key,
               CASE WHEN lower(btrim(s.recipient_uuid)) ~ '^[0-9a-f]{8}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{12}$'
                    THEN lower(btrim(s.recipient_uuid))::uuid END AS recipient_key,
               CASE WHEN lower(btrim(s.sender_uuid)) ~ '^[0-9a-f]{8}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{12}$'
                    THEN lower(btrim(s.sender_uuid))::uuid END AS sender_key,
               NULLIF(btrim(s.external_uuid), '')::uuid AS external_key,
               NULLIF(btrim(s.sent_at), '')::timestamptz AS sent_at_value,
               NULLIF(btrim(s.award_points), '')::integer AS award_points_value,
               NULLIF(btrim(s.award_name), '') AS award_name_value,
               NULLIF(btrim(s.level), '') AS level_value,
               NULLIF(btrim(s.message), '') AS message_value,
               COALESCE(NULLIF(btrim(s.approval_status), ''), 'PENDING') AS approval_status_value,
               NULLIF(btrim(s.rejection_reason), '') AS rejection_reason_value
        FROM staging_recognitions s
        WHERE s.job_id = $1
    ),
    resolved AS (
        SELECT s.*, rt.id AS type_id, e_rec.id AS recipient_id, e_s.id AS sender_id
        FROM staged s
        LEFT JOIN recognition_type rt ON rt.uuid = s.type_key
        LEFT JOIN employee e_rec ON e_rec.uuid = s.recipient_key
        LEFT JOIN employee e_s ON e_s.uuid = s.sender_key
    ),
    failed AS (
        INSERT INTO import_error (import_job_id, row_num, raw_data, error_message)
        SELECT r.job_id,
               r.row_num,
               ROW(r.external_uuid, r.type_uuid, r.award_name, r.level, r.recipient_uuid,
                   r.sender_uuid, r.sent_at, r.message, r.award_points, r.approval_status,
                   r.rejection_reason)::text,
               CASE WHEN r.type_id IS NULL THEN $2
                    WHEN r.recipient_id IS NULL THEN $3
                    WHEN r.sender_id IS NULL THEN $4
                    ELSE $5
               END
        FROM resolved r
        WHERE r.type_id IS NULL OR r.recipient_id IS NULL OR r.sender_id IS NULL
        ORDER BY r.row_num
        RETURNING 1
    ),
    inserted AS (
        INSERT INTO recognitions (uuid, recognition_type_id, award_name, level, recipient_id,
                                  sender_id, sent_at, message, award_points, approval_status,
                                  rejection_reason)
        SELECT COALESCE(r.external_key, gen_random_uuid()),
               r.type_id,
               r.award_name_value,
               r.level_value,
               r.recipient_id,
               r.sender_id,
               r.sent_at_value,
               r.message_value,
               r.award_points_value,
               r.approval_status_value,
               r.rejection_reason_value
        FROM resolved r
        WHERE r.type_id IS NOT NULL AND r.recipient_id IS NOT NULL AND r.sender_id IS NOT NULL
        ORDER BY r.row_num
        ON CONFLICT (uuid) DO NOTHING
        RETURNING 1
    ),
    drained AS (
        DELETE FROM staging_recognitions WHERE job_id = $1
        RETURNING 1
    )
    SELECT (SELECT COUNT(*) FROM resolved) AS staged,
           (SELECT COUNT(*) FROM failed) AS failed,
           (SELECT COUNT(*) FROM inserted) AS inserted,
           (SELECT COUNT(*) FROM drained) AS drained
"#;

/// Result of one validate/move pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Rows whose references all resolved (inserted or already present).
    pub resolved: i64,
    /// Rows newly written to production.
    pub inserted: i64,
    /// Rows recorded in the error ledger.
    pub failed: i64,
}

/// Partition the job's staged rows, record the unresolved ones in
/// `import_error`, insert the resolved ones into `recognitions` and drain the
/// job's staging rows, all in one statement.
///
/// Rows whose uuid already exists in production, or is being inserted by a
/// concurrent job, are left untouched and still count as resolved.
pub async fn resolve_and_move(pool: &PgPool, job_id: i64) -> Result<MoveOutcome, sqlx::Error> {
    let mut attempt = 1;
    loop {
        match move_once(pool, job_id).await {
            Err(e) if attempt < MAX_ATTEMPTS && is_retryable(&e) => {
                tracing::warn!(job_id, attempt, error = %e, "Retrying validate/move");
                attempt += 1;
            }
            result => return result,
        }
    }
}

async fn move_once(pool: &PgPool, job_id: i64) -> Result<MoveOutcome, sqlx::Error> {
    let (staged, failed, inserted, drained): (i64, i64, i64, i64) = sqlx::query_as(MOVE_SQL)
        .bind(job_id)
        .bind(ErrorCause::MissingType.as_str())
        .bind(ErrorCause::MissingRecipient.as_str())
        .bind(ErrorCause::MissingSender.as_str())
        .bind(ErrorCause::Unknown.as_str())
        .fetch_one(pool)
        .await?;

    let outcome = MoveOutcome {
        resolved: staged - failed,
        inserted,
        failed,
    };

    tracing::debug!(
        job_id,
        resolved = outcome.resolved,
        inserted = outcome.inserted,
        failed = outcome.failed,
        drained,
        "Moved staged rows"
    );

    Ok(outcome)
}

fn is_retryable(err: &sqlx::Error) -> bool {
    sqlstate(err).is_some_and(|code| RETRYABLE.contains(&code.as_str()))
}

/// True when the database rejected a value in the upload itself, such as an
/// unparseable timestamp or integer.
pub fn is_data_error(err: &sqlx::Error) -> bool {
    sqlstate(err).is_some_and(|code| code.starts_with("22"))
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}
