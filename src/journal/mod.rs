//! Journal entries grouped by date
//!
//! Raw entries come from the Monica API, are parsed into [`JournalRecord`]s,
//! rendered into lines and collected into one [`DateBucket`] per date. A
//! [`Journal`] is rebuilt from scratch on every run.

pub mod aggregate;
pub mod fetch;
pub mod record;
pub mod render;

pub use aggregate::{Aggregator, Grouping};
pub use fetch::{FetchError, Fetcher};
pub use record::{JournalRecord, RawEntry, RecordId};
pub use render::{PageTemplate, RenderedEntry};

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::cache::CacheError;

/// Errors that abort loading or rendering a journal
#[derive(Debug, Error)]
pub enum JournalError {
    /// The cache could not serve or store a response
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The remote request failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Missing expected field in a response
    #[error("Missing expected field in response: {0}")]
    MissingField(String),

    /// An entry did not have the expected shape
    #[error("Malformed journal entry: {0}")]
    Decode(#[from] serde_json::Error),

    /// A timestamp did not match its fixed format
    #[error("Invalid {field} timestamp '{value}': {source}")]
    Timestamp {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// The page template cannot be applied
    #[error("Invalid page template: {0}")]
    Template(String),
}

/// Entries sharing one date, in the order they were encountered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateBucket {
    date: NaiveDateTime,
    member_ids: Vec<String>,
    members: BTreeMap<String, RenderedEntry>,
}

impl DateBucket {
    /// Starts a bucket with a single member
    pub fn new(date: NaiveDateTime, id: impl Into<String>, entry: RenderedEntry) -> Self {
        let id = id.into();
        let mut members = BTreeMap::new();
        members.insert(id.clone(), entry);
        Self {
            date,
            member_ids: vec![id],
            members,
        }
    }

    /// Adds a member at the end
    ///
    /// An id seen before keeps its position and has its lines replaced.
    /// Returns whether the id was new.
    pub fn insert(&mut self, id: impl Into<String>, entry: RenderedEntry) -> bool {
        let id = id.into();
        let is_new = !self.members.contains_key(&id);
        if is_new {
            self.member_ids.push(id.clone());
        }
        self.members.insert(id, entry);
        is_new
    }

    pub fn date(&self) -> NaiveDateTime {
        self.date
    }

    pub fn member_ids(&self) -> &[String] {
        &self.member_ids
    }

    pub fn member(&self, id: &str) -> Option<&RenderedEntry> {
        self.members.get(id)
    }

    /// Members in `member_ids` order
    pub fn members(&self) -> impl Iterator<Item = &RenderedEntry> + '_ {
        self.member_ids
            .iter()
            .filter_map(|id| self.members.get(id))
    }

    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }

    /// Titles of the members, in order
    pub fn titles(&self) -> Vec<String> {
        self.members().map(|entry| entry.title().to_string()).collect()
    }
}

/// All buckets of one run, ordered by date
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Journal {
    buckets: BTreeMap<NaiveDateTime, DateBucket>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files `entry` under `date`, opening a bucket if needed
    ///
    /// Returns `true` when a new bucket was created.
    pub fn insert(&mut self, date: NaiveDateTime, id: &str, entry: RenderedEntry) -> bool {
        match self.buckets.get_mut(&date) {
            Some(bucket) => {
                bucket.insert(id, entry);
                false
            }
            None => {
                self.buckets.insert(date, DateBucket::new(date, id, entry));
                true
            }
        }
    }

    pub fn get(&self, date: &NaiveDateTime) -> Option<&DateBucket> {
        self.buckets.get(date)
    }

    pub fn buckets(&self) -> impl Iterator<Item = &DateBucket> + '_ {
        self.buckets.values()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.buckets.keys().copied()
    }

    /// Number of dates
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of entries across all dates
    pub fn entry_count(&self) -> usize {
        self.buckets.values().map(DateBucket::len).sum()
    }

    pub fn titles_for(&self, date: &NaiveDateTime) -> Option<Vec<String>> {
        self.buckets.get(date).map(DateBucket::titles)
    }

    pub fn all_titles(&self) -> BTreeMap<NaiveDateTime, Vec<String>> {
        self.buckets
            .iter()
            .map(|(date, bucket)| (*date, bucket.titles()))
            .collect()
    }
}
