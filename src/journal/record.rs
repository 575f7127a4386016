//! Journal entries as returned by the Monica API

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::JournalError;

/// Format of an entry's `date` field, e.g. `2022-10-31T00:00:00.000000Z`
///
/// The fraction is required and always has six digits.
pub const OCCURRED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.%6fZ";

/// Format of an entry's `created_at` field, e.g. `2022-10-31T21:10:32Z`
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Stand-in used in titles when an entry has none
pub const MISSING_TITLE: &str = "None";

/// Entry identifier; the API sends numbers but strings are accepted too
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

/// One element of the journal listing's `data` array
///
/// Only the fields used for rendering are kept; the rest of the entry
/// (account, uuid, url, ...) is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntry {
    pub id: RecordId,
    pub date: String,
    pub created_at: String,
    pub title: Option<String>,
    pub post: String,
}

/// A parsed journal entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub id: String,
    pub occurred_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub title: Option<String>,
    pub body: String,
}

impl JournalRecord {
    /// Parses both timestamps of a raw entry
    pub fn from_raw(raw: RawEntry) -> Result<Self, JournalError> {
        Ok(Self {
            id: raw.id.to_string(),
            occurred_at: parse_timestamp("date", &raw.date, OCCURRED_AT_FORMAT)?,
            created_at: parse_timestamp("created_at", &raw.created_at, CREATED_AT_FORMAT)?,
            title: raw.title,
            body: raw.post,
        })
    }

    /// Title shown on the page: `<title>, <created_at>`
    ///
    /// Adding the creation time keeps titles distinct and non-empty even for
    /// untitled entries with identical text.
    pub fn display_title(&self) -> String {
        format!(
            "{}, {}",
            self.title.as_deref().unwrap_or(MISSING_TITLE),
            self.created_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

fn parse_timestamp(
    field: &'static str,
    value: &str,
    format: &str,
) -> Result<NaiveDateTime, JournalError> {
    NaiveDateTime::parse_from_str(value, format).map_err(|source| JournalError::Timestamp {
        field,
        value: value.to_string(),
        source,
    })
}
