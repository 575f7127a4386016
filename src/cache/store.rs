//! Time-expiring key/value store persisted to a single JSON file
//!
//! The whole store is read when the cache is opened and written back in one
//! go when it is closed. Entries expire lazily: an entry past its expiry is
//! only noticed (and evicted) when it is read.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::diagnostics::{Observer, SyncEvent, TracingObserver};

/// Files at or below this size hold no entries (empty, or just `{}`)
const EMPTY_STORE_LEN: u64 = 2;

/// Time-to-live applied by [`TtlCache::put`]
pub const DEFAULT_TTL_SECS: i64 = 60 * 60;

/// Errors raised by the response cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// No entry for the key, or its entry has expired
    #[error("Key expired or not found: {key}")]
    Miss { key: String },

    /// The backing file could not be read or written
    #[error("Cache file {path} is not accessible: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but is not a valid store
    #[error("Cache file {path} is malformed: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// `now + ttl` is past the last representable instant
    #[error("TTL of {ttl} for {key} is out of range")]
    TtlOutOfRange { key: String, ttl: Duration },

    /// A payload could not be converted to or from JSON
    #[error("Cached payload could not be converted: {0}")]
    Payload(#[from] serde_json::Error),
}

impl CacheError {
    /// Whether this error only means "go fetch it"
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss { .. })
    }
}

/// One stored response: `[expiry, payload]` on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry(DateTime<Utc>, Value);

impl CacheEntry {
    pub fn new(expires_at: DateTime<Utc>, payload: Value) -> Self {
        Self(expires_at, payload)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn payload(&self) -> &Value {
        &self.1
    }

    /// Valid strictly before its expiry instant
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.0
    }
}

/// File-backed TTL cache
///
/// Open it with [`TtlCache::open`], use [`get`](TtlCache::get) and
/// [`put`](TtlCache::put), and finish with [`close`](TtlCache::close), which
/// writes the full store back whether or not anything changed. Prefer
/// [`CacheSession`](super::CacheSession) or [`with_cache`](super::with_cache)
/// so the store is flushed on every exit path.
pub struct TtlCache {
    path: PathBuf,
    store: BTreeMap<String, CacheEntry>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn Observer>,
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("path", &self.path)
            .field("entries", &self.store.len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl TtlCache {
    /// Opens the cache backed by `path`
    ///
    /// A missing file is created (with its parent directories) and the cache
    /// starts empty; so does a file too small to hold any entry.
    ///
    /// # Returns
    /// * `Err(CacheError::Io)` if the file exists but cannot be read, or cannot be created
    /// * `Err(CacheError::Corrupt)` if the file does not hold a valid store
    pub fn open(
        path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, CacheError> {
        let path = path.into();
        let store = match fs::metadata(&path) {
            Ok(meta) if !meta.is_file() => {
                return Err(CacheError::Io {
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "cache location is not a regular file",
                    ),
                    path,
                });
            }
            Ok(meta) if meta.len() > EMPTY_STORE_LEN => {
                let store = load_store(&path)?;
                observer.on_event(&SyncEvent::CacheLoaded {
                    path: path.clone(),
                    entries: store.len(),
                });
                store
            }
            Ok(_) => {
                observer.on_event(&SyncEvent::CacheCreated { path: path.clone() });
                BTreeMap::new()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                touch(&path)?;
                observer.on_event(&SyncEvent::CacheCreated { path: path.clone() });
                BTreeMap::new()
            }
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        Ok(Self {
            path,
            store,
            default_ttl: Duration::seconds(DEFAULT_TTL_SECS),
            clock,
            observer,
        })
    }

    /// Opens the cache with the system clock, logging through `tracing`
    pub fn open_default(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Self::open(path, Arc::new(SystemClock), Arc::new(TracingObserver))
    }

    /// Replaces the TTL used by [`put`](Self::put)
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Whether `key` would currently be served, without evicting anything
    pub fn contains_fresh(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.store
            .get(key)
            .map(|entry| entry.is_fresh_at(now))
            .unwrap_or(false)
    }

    /// Reads the payload stored under `key`
    ///
    /// An expired entry is removed from the store before the miss is
    /// reported, so later reads miss as well.
    pub fn get(&mut self, key: &str) -> Result<Value, CacheError> {
        let now = self.clock.now();
        let expired_at = match self.store.get(key) {
            None => {
                self.observer.on_event(&SyncEvent::CacheMiss {
                    key: key.to_string(),
                });
                return Err(CacheError::Miss {
                    key: key.to_string(),
                });
            }
            Some(entry) if entry.is_fresh_at(now) => {
                self.observer.on_event(&SyncEvent::CacheHit {
                    key: key.to_string(),
                });
                return Ok(entry.payload().clone());
            }
            Some(entry) => entry.expires_at(),
        };

        self.store.remove(key);
        self.observer.on_event(&SyncEvent::CacheExpired {
            key: key.to_string(),
            expired_at,
        });
        Err(CacheError::Miss {
            key: key.to_string(),
        })
    }

    /// Reads and decodes the payload stored under `key`
    pub fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> Result<T, CacheError> {
        let value = self.get(key)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Stores `payload` for the default TTL, replacing any previous entry
    pub fn put<T: Serialize + ?Sized>(&mut self, key: &str, payload: &T) -> Result<(), CacheError> {
        self.put_with_ttl(key, payload, self.default_ttl)
    }

    /// Stores `payload` until `now + ttl`, replacing any previous entry
    pub fn put_with_ttl<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        payload: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_value(payload)?;
        self.insert_value(key, value, ttl)
    }

    pub(crate) fn insert_value(
        &mut self,
        key: &str,
        value: Value,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at =
            self.clock
                .now()
                .checked_add_signed(ttl)
                .ok_or_else(|| CacheError::TtlOutOfRange {
                    key: key.to_string(),
                    ttl,
                })?;
        self.observer.on_event(&SyncEvent::CacheStored {
            key: key.to_string(),
            expires_at,
        });
        self.store
            .insert(key.to_string(), CacheEntry::new(expires_at, value));
        Ok(())
    }

    /// Writes the full store back to the backing file and releases the cache
    pub fn close(self) -> Result<(), CacheError> {
        self.flush()
    }

    pub(crate) fn flush(&self) -> Result<(), CacheError> {
        let json = serde_json::to_string(&self.store)?;
        fs::write(&self.path, json).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.observer.on_event(&SyncEvent::CacheFlushed {
            path: self.path.clone(),
            entries: self.store.len(),
        });
        Ok(())
    }

    pub(crate) fn observer(&self) -> &Arc<dyn Observer> {
        &self.observer
    }
}

fn load_store(path: &Path) -> Result<BTreeMap<String, CacheEntry>, CacheError> {
    let content = fs::read_to_string(path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Creates an empty file at `path`, including missing parent directories
fn touch(path: &Path) -> Result<(), CacheError> {
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    Ok(())
}
