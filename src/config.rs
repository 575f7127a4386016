//! YAML configuration
//!
//! The configuration file names the Monica API, the Zim notebook and the
//! page layout. Secrets are not stored in it: any value mentioning
//! `MONICA_API` is a reference, resolved from the environment variable of
//! that name or, failing that, from the same key in a separate secrets file.

use chrono::Duration;
use directories::ProjectDirs;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cache::DEFAULT_TTL_SECS;
use crate::journal::render::DEFAULT_DATE_LINE;
use crate::journal::{Grouping, PageTemplate};

/// Marker that identifies a secret reference
const SECRET_MARKER: &str = "MONICA_API";

/// `titles` key holding the page title marker
const PAGE_TITLE_LEVEL: i64 = 1;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid YAML, or lacks required keys
    #[error("Invalid configuration in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A secret reference could not be resolved
    #[error("Secret for '{key}' not found in environment ({reference}) or secrets file")]
    UnresolvedSecret { key: String, reference: String },

    /// `titles` has no marker for the requested level
    #[error("No title marker configured for level {0}")]
    MissingTitle(i64),

    /// `cache.ttl_secs` cannot be represented as a duration
    #[error("Cache TTL of {0} seconds is out of range")]
    InvalidTtl(i64),

    /// The header and date line do not fit together
    #[error("Invalid page template: {0}")]
    InvalidTemplate(String),
}

/// Response cache settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether API responses are cached at all
    pub enabled: bool,
    /// Backing file; the user cache directory when unset
    pub path: Option<PathBuf>,
    /// How long a cached response stays valid
    pub ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl CacheConfig {
    /// Configured path, else `~/.cache/journalsync/cache.json` (or the
    /// platform equivalent), else `cache.json` in the working directory
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        ProjectDirs::from("", "", "journalsync")
            .map(|dirs| dirs.cache_dir().join("cache.json"))
            .unwrap_or_else(|| PathBuf::from("cache.json"))
    }

    pub fn ttl(&self) -> Result<Duration, ConfigError> {
        Duration::try_seconds(self.ttl_secs).ok_or(ConfigError::InvalidTtl(self.ttl_secs))
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root URL of the Monica API
    pub api_url: String,
    /// Bearer token for the API
    #[serde(alias = "oath_key")]
    pub oauth_key: String,
    /// `titles` level used for entry titles
    pub monica_title: i64,
    /// Heading markers by level
    pub titles: BTreeMap<i64, String>,
    /// Line placed before every entry
    #[serde(default)]
    pub entry_sep: Option<String>,
    /// Directory holding the journal pages
    pub zim_journal_path: PathBuf,
    /// First lines of every page
    pub zim_header: Vec<String>,
    /// Header line that receives the page timestamp
    #[serde(default = "default_date_line")]
    pub date_line: usize,
    #[serde(default)]
    pub grouping: Grouping,
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_date_line() -> usize {
    DEFAULT_DATE_LINE
}

impl Config {
    /// Loads `path`, resolving secrets from the environment and `secrets_path`
    pub fn load(path: &Path, secrets_path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, secrets_path, |name| std::env::var(name).ok())
    }

    /// Like [`load`](Self::load), with a custom environment lookup
    pub fn load_with<F>(path: &Path, secrets_path: &Path, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut value = read_yaml(path)?;
        resolve_secrets(&mut value, secrets_path, env)?;
        let config: Config = serde_yaml::from_value(value).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        config.cache.ttl()?;
        Ok(config)
    }

    fn title(&self, level: i64) -> Result<&str, ConfigError> {
        self.titles
            .get(&level)
            .map(String::as_str)
            .ok_or(ConfigError::MissingTitle(level))
    }

    /// Page layout described by this configuration
    pub fn page_template(&self) -> Result<PageTemplate, ConfigError> {
        PageTemplate::new(
            self.zim_header.clone(),
            self.date_line,
            self.title(PAGE_TITLE_LEVEL)?,
            self.title(self.monica_title)?,
            self.entry_sep.clone(),
        )
        .map_err(|e| ConfigError::InvalidTemplate(e.to_string()))
    }
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Replaces top-level secret references in `config`
///
/// The secrets file is only read when a reference is not found in the
/// environment.
fn resolve_secrets<F>(config: &mut Value, secrets_path: &Path, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(mapping) = config.as_mapping_mut() else {
        return Ok(());
    };
    let mut secrets: Option<Value> = None;

    for (key, value) in mapping.iter_mut() {
        let Some(reference) = value.as_str().filter(|s| s.contains(SECRET_MARKER)) else {
            continue;
        };
        let reference = reference.trim().to_string();
        let key = key.as_str().unwrap_or_default().to_string();

        if let Some(secret) = env(&reference) {
            *value = Value::String(secret);
            continue;
        }

        if secrets.is_none() && secrets_path.is_file() {
            secrets = Some(read_yaml(secrets_path)?);
        }
        match secrets.as_ref().and_then(|s| s.get(key.as_str())) {
            Some(secret) => *value = secret.clone(),
            None => return Err(ConfigError::UnresolvedSecret { key, reference }),
        }
    }
    Ok(())
}
