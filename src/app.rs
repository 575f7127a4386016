//! Sync runs
//!
//! Ties configuration, the response cache, the aggregator and the page
//! writer together. The cache is opened once per run and flushed once at
//! the end, whether the run succeeded or not.

use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::{CacheError, CacheSession, NoCache};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigError};
use crate::diagnostics::{Observer, TracingObserver};
use crate::journal::{Aggregator, FetchError, Fetcher, Journal, JournalError};
use crate::monica::MonicaClient;
use crate::zim::{self, PageError};

/// Anything that can end a run
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Page(#[from] PageError),
}

/// Outcome of writing the journal to the notebook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries per date, in date order
    pub dates: Vec<(NaiveDateTime, usize)>,
    /// Pages written, in date order
    pub written: Vec<PathBuf>,
}

/// A configured sync application
pub struct App {
    config: Config,
    use_cache: bool,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn Observer>,
}

impl App {
    /// Creates an app using the system clock and `tracing` for diagnostics
    pub fn new(config: Config) -> Self {
        let use_cache = config.cache.enabled;
        Self {
            config,
            use_cache,
            clock: Arc::new(SystemClock),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Bypasses the response cache regardless of configuration
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn aggregator(&self) -> Result<Aggregator, AppError> {
        Ok(Aggregator::new(self.config.page_template()?)
            .with_grouping(self.config.grouping)
            .with_ttl(self.config.cache.ttl()?)
            .with_observer(self.observer.clone()))
    }

    fn open_cache(&self) -> Result<Option<CacheSession>, AppError> {
        if !self.use_cache {
            tracing::debug!("bypassing cache");
            return Ok(None);
        }
        let session = CacheSession::open(
            self.config.cache.resolved_path(),
            self.clock.clone(),
            self.observer.clone(),
        )?;
        Ok(Some(session))
    }

    fn client(&self) -> Result<MonicaClient, AppError> {
        Ok(MonicaClient::new(self.config.oauth_key.clone())?)
    }

    /// Loads the journal from the configured Monica instance
    pub async fn load_journal(&self) -> Result<Journal, AppError> {
        self.load_journal_with(&self.client()?).await
    }

    /// Loads the journal through `fetcher`
    pub async fn load_journal_with<F: Fetcher>(&self, fetcher: &F) -> Result<Journal, AppError> {
        let aggregator = self.aggregator()?;
        let api_url = self.config.api_url.as_str();

        match self.open_cache()? {
            Some(mut session) => {
                let result = aggregator.load(api_url, fetcher, &mut session).await;
                let closed = session.close();
                let journal = result?;
                closed?;
                Ok(journal)
            }
            None => Ok(aggregator.load(api_url, fetcher, &mut NoCache).await?),
        }
    }

    /// Whether the configured API answers as expected
    pub async fn check_api(&self) -> Result<bool, AppError> {
        self.check_api_with(&self.client()?).await
    }

    pub async fn check_api_with<F: Fetcher>(&self, fetcher: &F) -> Result<bool, AppError> {
        let aggregator = self.aggregator()?;
        let api_url = self.config.api_url.as_str();

        match self.open_cache()? {
            Some(mut session) => {
                let result = aggregator.check_api(api_url, fetcher, &mut session).await;
                let closed = session.close();
                let ok = result?;
                closed?;
                Ok(ok)
            }
            None => Ok(aggregator.check_api(api_url, fetcher, &mut NoCache).await?),
        }
    }

    /// Loads the journal and overwrites its pages in the notebook
    pub async fn sync(&self) -> Result<SyncReport, AppError> {
        self.sync_with(&self.client()?, &Local).await
    }

    /// Loads through `fetcher` and writes pages stamped in `tz`
    pub async fn sync_with<F, Tz>(&self, fetcher: &F, tz: &Tz) -> Result<SyncReport, AppError>
    where
        F: Fetcher,
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let journal = self.load_journal_with(fetcher).await?;
        let template = self.config.page_template()?;
        let written = zim::write_journal(
            &journal,
            &template,
            &self.config.zim_journal_path,
            tz,
            self.observer.as_ref(),
        )?;
        Ok(SyncReport {
            dates: journal.buckets().map(|b| (b.date(), b.len())).collect(),
            written,
        })
    }

    /// Titles of every entry, by date
    pub async fn titles(&self) -> Result<BTreeMap<NaiveDateTime, Vec<String>>, AppError> {
        Ok(self.load_journal().await?.all_titles())
    }

    /// Pages already present in the notebook
    pub fn pages(&self) -> Result<Vec<(NaiveDate, PathBuf)>, AppError> {
        Ok(zim::existing_pages(&self.config.zim_journal_path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::config::CacheConfig;
    use crate::diagnostics::{NullObserver, RecordingObserver, SyncEvent};
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    fn test_config(root: PathBuf) -> Config {
        Config {
            api_url: "https://monica.test/api".to_string(),
            oauth_key: "token".to_string(),
            monica_title: 2,
            titles: BTreeMap::from([(1, "======".to_string()), (2, "=====".to_string())]),
            entry_sep: Some("---".to_string()),
            zim_journal_path: root,
            zim_header: vec![
                "Content-Type: text/x-zim-wiki".to_string(),
                "Wiki-Format: zim 0.6".to_string(),
                "Creation-Date: ".to_string(),
            ],
            date_line: 2,
            grouping: Default::default(),
            cache: CacheConfig::default(),
        }
    }

    struct StaticFetcher {
        calls: Cell<usize>,
    }

    impl StaticFetcher {
        fn new() -> Self {
            Self { calls: Cell::new(0) }
        }
    }

    impl Fetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
            self.calls.set(self.calls.get() + 1);
            if url.ends_with("/journal") {
                Ok(json!({"data": [{
                    "id": 7,
                    "date": "2022-10-31T00:00:00.000000Z",
                    "created_at": "2022-10-31T21:10:32Z",
                    "title": null,
                    "post": "Only note"
                }]}))
            } else {
                Ok(json!({"success": {}, "links": {"journal_url": format!("{}/journal", url)}}))
            }
        }
    }

    fn app(dir: &TempDir, cache: CacheConfig) -> App {
        let mut config = test_config(dir.path().join("Journal"));
        config.cache = cache;
        App::new(config)
            .with_clock(Arc::new(MockClock::new()))
            .with_observer(Arc::new(NullObserver))
    }

    fn cache_in(dir: &TempDir) -> CacheConfig {
        CacheConfig {
            enabled: true,
            path: Some(dir.path().join("cache.json")),
            ttl_secs: 3600,
        }
    }

    #[tokio::test]
    async fn test_sync_writes_pages_and_cache() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let app = app(&dir, cache_in(&dir));
        let fetcher = StaticFetcher::new();

        let report = app.sync_with(&fetcher, &Utc).await.unwrap();

        assert_eq!(report.written, vec![dir.path().join("Journal/2022/10/31.txt")]);
        assert_eq!(report.dates.len(), 1);
        assert_eq!(report.dates[0].1, 1);
        let cache: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("cache.json")).unwrap()).unwrap();
        assert_eq!(cache.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_run_uses_cache_file() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let fetcher = StaticFetcher::new();

        app(&dir, cache_in(&dir)).load_journal_with(&fetcher).await.unwrap();
        app(&dir, cache_in(&dir)).load_journal_with(&fetcher).await.unwrap();

        assert_eq!(fetcher.calls.get(), 2);
    }

    #[tokio::test]
    async fn test_without_cache_fetches_every_time() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let fetcher = StaticFetcher::new();

        app(&dir, cache_in(&dir)).without_cache().load_journal_with(&fetcher).await.unwrap();
        app(&dir, cache_in(&dir)).without_cache().load_journal_with(&fetcher).await.unwrap();

        assert_eq!(fetcher.calls.get(), 4);
        assert!(!dir.path().join("cache.json").exists());
    }

    #[tokio::test]
    async fn test_cache_flushed_when_load_fails() {
        struct FailingListing;

        impl Fetcher for FailingListing {
            async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
                if url.ends_with("/journal") {
                    Err(FetchError::Status {
                        url: url.to_string(),
                        status: 500,
                    })
                } else {
                    Ok(json!({"links": {"journal_url": format!("{}/journal", url)}}))
                }
            }
        }

        let dir = TempDir::new().expect("Failed to create temp directory");
        let observer = Arc::new(RecordingObserver::new());
        let app = app(&dir, cache_in(&dir)).with_observer(observer.clone());

        let err = app.load_journal_with(&FailingListing).await.unwrap_err();

        assert!(matches!(err, AppError::Journal(JournalError::Fetch(_))));
        let flushes = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, SyncEvent::CacheFlushed { .. }))
            .count();
        assert_eq!(flushes, 1);
        let cache: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("cache.json")).unwrap()).unwrap();
        assert!(cache.get(app.config().api_url.as_str()).is_some());
    }

    #[tokio::test]
    async fn test_check_api() {
        let dir = TempDir::new().expect("Failed to create temp directory");

        let ok = app(&dir, cache_in(&dir))
            .check_api_with(&StaticFetcher::new())
            .await
            .unwrap();

        assert!(ok);
    }

    #[tokio::test]
    async fn test_pages_lists_written_pages() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let app = app(&dir, cache_in(&dir));
        assert!(app.pages().unwrap().is_empty());

        app.sync_with(&StaticFetcher::new(), &Utc).await.unwrap();

        let pages = app.pages().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].0, NaiveDate::from_ymd_opt(2022, 10, 31).unwrap());
    }
}
