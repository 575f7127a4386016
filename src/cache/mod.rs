//! Cache module for storing API responses to disk
//!
//! Responses are kept in a single JSON file mapping each request URL to an
//! `[expiry, payload]` pair. The file is loaded when the cache is opened and
//! written back in full when it is closed; expired entries are evicted the
//! first time they are read.

mod session;
mod store;

pub use session::{with_cache, CacheSession, NoCache, ResponseCache};
pub use store::{CacheEntry, CacheError, TtlCache, DEFAULT_TTL_SECS};
