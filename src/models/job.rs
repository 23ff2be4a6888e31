use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Lifecycle state of an import job.
///
/// Stored as upper-case text in `import_job.status`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Partial,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Partial | JobStatus::Failed)
    }

    /// Status is monotonic: PENDING -> RUNNING -> terminal. A PENDING job may
    /// also fail directly when it never gets picked up (startup recovery).
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,
            (JobStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    /// Terminal status for a job whose load and move both completed.
    pub fn for_completed(failed_count: i64) -> JobStatus {
        if failed_count > 0 {
            JobStatus::Partial
        } else {
            JobStatus::Success
        }
    }
}

/// One bulk-import attempt for one uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: i64,
    pub filename: String,
    pub status: JobStatus,
    pub total_rows: i64,
    pub success_count: i64,
    pub failed_count: i64,
    /// Rows newly written to `recognitions` by this job. Rows whose uuid already
    /// existed count towards `success_count` but not here.
    pub inserted_count: i64,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Counts produced by a completed load + move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub total_rows: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub inserted_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_text_round_trip() {
        assert_eq!(JobStatus::Pending.as_str(), "PENDING");
        assert_eq!(JobStatus::Partial.to_string(), "PARTIAL");
        assert_eq!(JobStatus::from_str("RUNNING").unwrap(), JobStatus::Running);
        assert!(JobStatus::from_str("processing").is_err());
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&JobStatus::Success).unwrap();
        assert_eq!(json, "\"SUCCESS\"");
    }

    #[test]
    fn test_transitions_are_monotonic() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Success));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Partial));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));

        assert!(!JobStatus::Running.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Success));
        assert!(!JobStatus::Success.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn test_completed_status_depends_on_failures() {
        assert_eq!(JobStatus::for_completed(0), JobStatus::Success);
        assert_eq!(JobStatus::for_completed(1), JobStatus::Partial);
    }
}
