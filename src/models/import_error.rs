use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Why a staged row could not be resolved. Exactly one cause is recorded per
/// row, chosen in declaration order: type, then recipient, then sender.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, IntoStaticStr,
)]
pub enum ErrorCause {
    #[strum(serialize = "missing recognition_type")]
    #[serde(rename = "missing recognition_type")]
    MissingType,
    #[strum(serialize = "missing recipient")]
    #[serde(rename = "missing recipient")]
    MissingRecipient,
    #[strum(serialize = "missing sender")]
    #[serde(rename = "missing sender")]
    MissingSender,
    #[strum(serialize = "unknown")]
    #[serde(rename = "unknown")]
    Unknown,
}

impl ErrorCause {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Pick the single cause for a row given which references resolved.
    /// Returns `None` for a fully resolved row.
    pub fn classify(type_found: bool, recipient_found: bool, sender_found: bool) -> Option<Self> {
        if !type_found {
            Some(ErrorCause::MissingType)
        } else if !recipient_found {
            Some(ErrorCause::MissingRecipient)
        } else if !sender_found {
            Some(ErrorCause::MissingSender)
        } else {
            None
        }
    }
}

/// One rejected input row of one import job. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImportErrorRecord {
    pub id: i64,
    pub row_num: i64,
    pub raw_data: Option<String>,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

/// Offset page of a job's error ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPage {
    pub items: Vec<ImportErrorRecord>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
}
