use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Columns an uploaded recognitions CSV may carry. Each maps 1:1 onto a column
/// of `staging_recognitions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CsvColumn {
    ExternalUuid,
    TypeUuid,
    AwardName,
    Level,
    RecipientUuid,
    SenderUuid,
    SentAt,
    Message,
    AwardPoints,
    ApprovalStatus,
    RejectionReason,
}

impl CsvColumn {
    /// Columns without which no row could ever resolve.
    pub const REQUIRED: [CsvColumn; 3] = [
        CsvColumn::TypeUuid,
        CsvColumn::RecipientUuid,
        CsvColumn::SenderUuid,
    ];

    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Canonical header, in the documented column order.
    pub fn canonical_header() -> Vec<&'static str> {
        CsvColumn::iter().map(CsvColumn::as_str).collect()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("CSV file has no header row")]
    Empty,

    #[error("Unknown CSV column '{0}'")]
    Unknown(String),

    #[error("Duplicate CSV column '{0}'")]
    Duplicate(String),

    #[error("Required CSV column '{0}' is missing")]
    Missing(&'static str),
}

/// Map a header record onto staging columns, preserving file order.
pub fn map_header<'a, I>(names: I) -> Result<Vec<CsvColumn>, HeaderError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut columns = Vec::new();
    let mut seen = HashSet::new();

    for raw in names {
        let name = raw.trim().trim_start_matches('\u{feff}');
        let column =
            CsvColumn::from_str(name).map_err(|_| HeaderError::Unknown(name.to_string()))?;
        if !seen.insert(column) {
            return Err(HeaderError::Duplicate(column.as_str().to_string()));
        }
        columns.push(column);
    }

    if columns.is_empty() {
        return Err(HeaderError::Empty);
    }

    for required in CsvColumn::REQUIRED {
        if !seen.contains(&required) {
            return Err(HeaderError::Missing(required.as_str()));
        }
    }

    Ok(columns)
}

/// A recognitions CSV record as read by the in-memory importer.
/// Blank cells deserialize to `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CsvRecognitionRow {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub external_uuid: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub type_uuid: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub award_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub level: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub recipient_uuid: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub sender_uuid: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub sent_at: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub award_points: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub approval_status: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub rejection_reason: Option<String>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}
