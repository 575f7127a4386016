//! Diagnostic events emitted while syncing
//!
//! The cache, aggregator and page writer report what they do through an
//! injected [`Observer`] rather than logging directly. The binary plugs in
//! [`TracingObserver`]; tests can use [`RecordingObserver`] to assert on the
//! exact sequence of events.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Something worth reporting that happened during a sync run
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// An existing backing file was read
    CacheLoaded { path: PathBuf, entries: usize },
    /// No usable backing file existed, an empty store was started
    CacheCreated { path: PathBuf },
    /// A fresh entry was served
    CacheHit { key: String },
    /// No entry existed for the key
    CacheMiss { key: String },
    /// An entry was found past its expiry and evicted
    CacheExpired { key: String, expired_at: DateTime<Utc> },
    /// An entry was stored
    CacheStored { key: String, expires_at: DateTime<Utc> },
    /// The store was written back to disk
    CacheFlushed { path: PathBuf, entries: usize },
    /// Flushing on scope exit failed; the error could not be returned
    CacheFlushFailed { path: PathBuf, error: String },
    /// A remote request is about to be made
    FetchStarted { url: String },
    /// The journal listing was decoded
    ListingParsed { url: String, entries: usize },
    /// A record opened a new date bucket
    BucketCreated { date: NaiveDateTime, id: String },
    /// A record joined an existing date bucket
    BucketExtended { date: NaiveDateTime, id: String },
    /// A page was written to disk
    PageWritten { path: PathBuf, lines: usize },
    /// A page written earlier in the same run was overwritten by another date
    PageReplaced { path: PathBuf, date: NaiveDateTime },
}

/// Receiver for diagnostic events
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::CacheLoaded { path, entries } => {
                tracing::debug!(path = %path.display(), entries, "loaded cache");
            }
            SyncEvent::CacheCreated { path } => {
                tracing::debug!(path = %path.display(), "no cache found, starting empty");
            }
            SyncEvent::CacheHit { key } => {
                tracing::info!(%key, "serving response from cache");
            }
            SyncEvent::CacheMiss { key } => {
                tracing::debug!(%key, "no cached response");
            }
            SyncEvent::CacheExpired { key, expired_at } => {
                tracing::info!(%key, %expired_at, "cached response expired");
            }
            SyncEvent::CacheStored { key, expires_at } => {
                tracing::debug!(%key, %expires_at, "cached response");
            }
            SyncEvent::CacheFlushed { path, entries } => {
                tracing::debug!(path = %path.display(), entries, "wrote cache");
            }
            SyncEvent::CacheFlushFailed { path, error } => {
                tracing::error!(path = %path.display(), %error, "failed to write cache");
            }
            SyncEvent::FetchStarted { url } => {
                tracing::debug!(%url, "requesting API data");
            }
            SyncEvent::ListingParsed { url, entries } => {
                tracing::info!(%url, entries, "journal loaded");
            }
            SyncEvent::BucketCreated { date, id } => {
                tracing::debug!(%date, %id, "new date in journal");
            }
            SyncEvent::BucketExtended { date, id } => {
                tracing::debug!(%date, %id, "date already in journal");
            }
            SyncEvent::PageWritten { path, lines } => {
                tracing::info!(path = %path.display(), lines, "wrote page");
            }
            SyncEvent::PageReplaced { path, date } => {
                tracing::warn!(path = %path.display(), %date, "page already written this run, replacing it");
            }
        }
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn on_event(&self, _event: &SyncEvent) {}
}

/// Keeps every event in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl Observer for RecordingObserver {
    fn on_event(&self, event: &SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
