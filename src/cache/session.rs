//! Scoped access to the response cache
//!
//! A cache opened for a sync run must be written back exactly once, whether
//! the run succeeds or fails. [`CacheSession`] does this on drop when the
//! caller did not close it explicitly; [`with_cache`] wraps a closure.

use chrono::Duration;
use serde_json::Value;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

use super::store::{CacheError, TtlCache};
use crate::clock::Clock;
use crate::diagnostics::{Observer, SyncEvent};

/// What the aggregator needs from a cache
pub trait ResponseCache {
    /// Returns the cached payload, or `CacheError::Miss`
    fn lookup(&mut self, key: &str) -> Result<Value, CacheError>;

    /// Stores a payload; `None` uses the cache's default TTL
    fn store(&mut self, key: &str, payload: Value, ttl: Option<Duration>) -> Result<(), CacheError>;
}

impl ResponseCache for TtlCache {
    fn lookup(&mut self, key: &str) -> Result<Value, CacheError> {
        self.get(key)
    }

    fn store(&mut self, key: &str, payload: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let ttl = ttl.unwrap_or_else(|| self.default_ttl());
        self.insert_value(key, payload, ttl)
    }
}

/// Cache stand-in used when caching is switched off: always misses
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl ResponseCache for NoCache {
    fn lookup(&mut self, key: &str) -> Result<Value, CacheError> {
        Err(CacheError::Miss {
            key: key.to_string(),
        })
    }

    fn store(&mut self, _key: &str, _payload: Value, _ttl: Option<Duration>) -> Result<(), CacheError> {
        Ok(())
    }
}

/// An open cache that is flushed exactly once
///
/// Call [`close`](CacheSession::close) to flush and see any write error. If
/// the session is dropped instead (early return, `?`, panic), the store is
/// still flushed and a failure is reported to the cache's observer.
#[derive(Debug)]
pub struct CacheSession {
    cache: Option<TtlCache>,
}

impl CacheSession {
    pub fn new(cache: TtlCache) -> Self {
        Self { cache: Some(cache) }
    }

    pub fn open(
        path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, CacheError> {
        TtlCache::open(path, clock, observer).map(Self::new)
    }

    /// Flushes the store and ends the session
    pub fn close(mut self) -> Result<(), CacheError> {
        match self.cache.take() {
            Some(cache) => cache.close(),
            None => Ok(()),
        }
    }
}

impl Deref for CacheSession {
    type Target = TtlCache;

    fn deref(&self) -> &TtlCache {
        self.cache
            .as_ref()
            .unwrap_or_else(|| unreachable!("cache is only taken when the session ends"))
    }
}

impl DerefMut for CacheSession {
    fn deref_mut(&mut self) -> &mut TtlCache {
        self.cache
            .as_mut()
            .unwrap_or_else(|| unreachable!("cache is only taken when the session ends"))
    }
}

impl Drop for CacheSession {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.take() {
            if let Err(e) = cache.flush() {
                cache.observer().on_event(&SyncEvent::CacheFlushFailed {
                    path: cache.path().to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
    }
}

impl ResponseCache for CacheSession {
    fn lookup(&mut self, key: &str) -> Result<Value, CacheError> {
        (**self).lookup(key)
    }

    fn store(&mut self, key: &str, payload: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        (**self).store(key, payload, ttl)
    }
}

/// Opens the cache, runs `f` with it, then flushes it
///
/// The flush happens even when `f` fails or panics. An error from `f` takes
/// precedence over a flush error.
pub fn with_cache<R, E, F>(
    path: impl Into<PathBuf>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn Observer>,
    f: F,
) -> Result<R, E>
where
    F: FnOnce(&mut TtlCache) -> Result<R, E>,
    E: From<CacheError>,
{
    let mut session = CacheSession::open(path, clock, observer)?;
    let result = f(&mut *session);
    let closed = session.close();
    let value = result?;
    closed?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::diagnostics::{NullObserver, RecordingObserver};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn read_store(path: &std::path::Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_session_flushes_on_drop() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("cache.json");

        {
            let mut session =
                CacheSession::open(&path, Arc::new(MockClock::new()), Arc::new(NullObserver)).unwrap();
            session.put("key", &json!("value")).unwrap();
        }

        assert_eq!(read_store(&path)["key"][1], json!("value"));
    }

    #[test]
    fn test_session_flushes_when_scope_exits_with_error() {
        fn failing_run(path: &std::path::Path) -> Result<(), CacheError> {
            let mut session =
                CacheSession::open(path, Arc::new(MockClock::new()), Arc::new(NullObserver))?;
            session.put("before_failure", &json!(1))?;
            session.get("absent")?;
            session.close()
        }

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("cache.json");

        assert!(failing_run(&path).unwrap_err().is_miss());
        assert_eq!(read_store(&path)["before_failure"][1], json!(1));
    }

    #[test]
    fn test_session_close_flushes_once() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let observer = Arc::new(RecordingObserver::new());
        let session = CacheSession::open(
            temp_dir.path().join("cache.json"),
            Arc::new(MockClock::new()),
            observer.clone(),
        )
        .unwrap();

        session.close().unwrap();

        let flushes = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, SyncEvent::CacheFlushed { .. }))
            .count();
        assert_eq!(flushes, 1);
    }

    #[test]
    fn test_with_cache_flushes_after_closure_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("cache.json");

        let result: Result<(), CacheError> = with_cache(
            &path,
            Arc::new(MockClock::new()),
            Arc::new(NullObserver),
            |cache| {
                cache.put("written", &json!([1, 2, 3]))?;
                cache.get("missing").map(|_| ())
            },
        );

        assert!(result.unwrap_err().is_miss());
        assert_eq!(read_store(&path)["written"][1], json!([1, 2, 3]));
    }

    #[test]
    fn test_with_cache_flushes_when_closure_panics() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("cache.json");

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), CacheError> = with_cache(
                &path,
                Arc::new(MockClock::new()),
                Arc::new(NullObserver),
                |cache| {
                    cache.put("before_panic", &json!("kept"))?;
                    panic!("listing handler blew up");
                },
            );
        }));

        assert!(outcome.is_err());
        assert_eq!(read_store(&path)["before_panic"][1], json!("kept"));
    }

    #[test]
    fn test_with_cache_returns_closure_value() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        let value: Result<usize, CacheError> = with_cache(
            temp_dir.path().join("cache.json"),
            Arc::new(MockClock::new()),
            Arc::new(NullObserver),
            |cache| {
                cache.put("a", &json!(1))?;
                cache.put("b", &json!(2))?;
                Ok(cache.len())
            },
        );

        assert_eq!(value.unwrap(), 2);
    }

    #[test]
    fn test_no_cache_always_misses() {
        let mut cache = NoCache;

        cache.store("key", json!(1), None).unwrap();

        assert!(cache.lookup("key").unwrap_err().is_miss());
    }

    #[test]
    fn test_store_without_ttl_uses_default() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clock = Arc::new(MockClock::new());
        let mut cache = TtlCache::open(
            temp_dir.path().join("cache.json"),
            clock.clone(),
            Arc::new(NullObserver),
        )
        .unwrap()
        .with_default_ttl(Duration::seconds(10));

        cache.store("key", json!("v"), None).unwrap();
        clock.advance(Duration::seconds(11));

        assert!(cache.lookup("key").unwrap_err().is_miss());
    }
}
