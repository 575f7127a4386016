//! Loading the journal through the response cache
//!
//! Two requests are made per run: the API root (to discover the journal
//! URL) and the journal listing. Each response is looked up in the cache
//! under its own URL first and only fetched on a miss.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::render::render_entry;
use super::{Fetcher, Journal, JournalError, JournalRecord, PageTemplate, RawEntry};
use crate::cache::ResponseCache;
use crate::diagnostics::{Observer, SyncEvent, TracingObserver};

/// How entries are assigned to pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// One bucket per distinct `date` timestamp
    #[default]
    Timestamp,
    /// One bucket per calendar day, ignoring time of day
    CalendarDay,
}

impl Grouping {
    /// Bucket key for an entry's date
    pub fn bucket_key(self, occurred_at: NaiveDateTime) -> NaiveDateTime {
        match self {
            Grouping::Timestamp => occurred_at,
            Grouping::CalendarDay => occurred_at.date().and_time(NaiveTime::default()),
        }
    }
}

/// Builds a [`Journal`] from the Monica API
pub struct Aggregator {
    template: PageTemplate,
    grouping: Grouping,
    ttl: Option<Duration>,
    observer: Arc<dyn Observer>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("template", &self.template)
            .field("grouping", &self.grouping)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Aggregator {
    /// Creates an aggregator that logs through `tracing`
    pub fn new(template: PageTemplate) -> Self {
        Self {
            template,
            grouping: Grouping::default(),
            ttl: None,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }

    /// TTL for responses stored by this aggregator; the cache default otherwise
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn template(&self) -> &PageTemplate {
        &self.template
    }

    /// Returns the response for `url`, from the cache if it holds a fresh one
    ///
    /// On a miss the response is fetched and stored. Other cache errors are
    /// returned as is.
    pub async fn resolve<F, C>(
        &self,
        url: &str,
        fetcher: &F,
        cache: &mut C,
    ) -> Result<Value, JournalError>
    where
        F: Fetcher + ?Sized,
        C: ResponseCache + ?Sized,
    {
        match cache.lookup(url) {
            Ok(response) => return Ok(response),
            Err(e) if e.is_miss() => {}
            Err(e) => return Err(e.into()),
        }

        self.observer.on_event(&SyncEvent::FetchStarted {
            url: url.to_string(),
        });
        let response = fetcher.fetch(url).await?;
        cache.store(url, response.clone(), self.ttl)?;
        Ok(response)
    }

    /// Whether the API root answers with a `success` member
    pub async fn check_api<F, C>(
        &self,
        api_url: &str,
        fetcher: &F,
        cache: &mut C,
    ) -> Result<bool, JournalError>
    where
        F: Fetcher + ?Sized,
        C: ResponseCache + ?Sized,
    {
        let response = self.resolve(api_url, fetcher, cache).await?;
        Ok(response.get("success").is_some())
    }

    /// Reads `links.journal_url` from the API root
    pub async fn discover_journal_url<F, C>(
        &self,
        api_url: &str,
        fetcher: &F,
        cache: &mut C,
    ) -> Result<String, JournalError>
    where
        F: Fetcher + ?Sized,
        C: ResponseCache + ?Sized,
    {
        let response = self.resolve(api_url, fetcher, cache).await?;
        journal_url(&response)
    }

    /// Loads every entry and groups them by date
    pub async fn load<F, C>(
        &self,
        api_url: &str,
        fetcher: &F,
        cache: &mut C,
    ) -> Result<Journal, JournalError>
    where
        F: Fetcher + ?Sized,
        C: ResponseCache + ?Sized,
    {
        let journal_url = self.discover_journal_url(api_url, fetcher, cache).await?;
        let listing = self.resolve(&journal_url, fetcher, cache).await?;
        let records = parse_listing(&listing)?;
        self.observer.on_event(&SyncEvent::ListingParsed {
            url: journal_url,
            entries: records.len(),
        });
        Ok(self.aggregate(&records))
    }

    /// Groups parsed records, keeping their order within each bucket
    pub fn aggregate(&self, records: &[JournalRecord]) -> Journal {
        let mut journal = Journal::new();
        for record in records {
            let date = self.grouping.bucket_key(record.occurred_at);
            let entry = render_entry(record, &self.template);
            let created = journal.insert(date, &record.id, entry);
            let event = if created {
                SyncEvent::BucketCreated {
                    date,
                    id: record.id.clone(),
                }
            } else {
                SyncEvent::BucketExtended {
                    date,
                    id: record.id.clone(),
                }
            };
            self.observer.on_event(&event);
        }
        journal
    }
}

/// Extracts `links.journal_url` from an API root response
pub fn journal_url(response: &Value) -> Result<String, JournalError> {
    response
        .pointer("/links/journal_url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| JournalError::MissingField("links.journal_url".to_string()))
}

/// Parses the `data` array of a journal listing, in order
///
/// Any malformed entry fails the whole listing.
pub fn parse_listing(listing: &Value) -> Result<Vec<JournalRecord>, JournalError> {
    let data = listing
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| JournalError::MissingField("data".to_string()))?;

    data.iter()
        .map(|item| {
            let raw = RawEntry::deserialize(item)?;
            JournalRecord::from_raw(raw)
        })
        .collect()
}
