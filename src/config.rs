//! Service configuration, read from an optional `opml2json.toml`.
//!
//! Every key has a default, so a missing file, an empty file or any subset
//! of keys is valid. Unrecognised keys are kept out of the struct but logged,
//! since they are usually typos.
use serde::Deserialize;
use std::fs::File;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::util::UrlPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Service configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Seconds a fetched feed stays fresh in the cache.
    pub cache_ttl_secs: u64,

    /// Maximum number of feed URLs kept in the cache (0 = unbounded).
    pub cache_capacity: usize,

    /// Maximum number of feeds fetched concurrently per request.
    pub fetch_concurrency: usize,

    /// Upper bound for a single OPML or feed fetch, retries included.
    pub fetch_timeout_secs: u64,

    /// Page size when the request does not specify `limit`.
    pub default_limit: usize,

    /// Largest accepted `limit`; larger requests are clamped.
    pub max_limit: usize,

    /// Allow fetching from localhost and private networks.
    pub allow_private_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            cache_ttl_secs: 3600,
            cache_capacity: 0,
            fetch_concurrency: 10,
            fetch_timeout_secs: 30,
            default_limit: 20,
            max_limit: 500,
            allow_private_hosts: false,
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "listen_addr",
        "cache_ttl_secs",
        "cache_capacity",
        "fetch_concurrency",
        "fetch_timeout_secs",
        "default_limit",
        "max_limit",
        "allow_private_hosts",
    ];

    /// Loads configuration from a TOML file.
    ///
    /// - Missing or blank file → `Ok(Config::default())`
    /// - File over 1 MB → `Err(ConfigError::TooLarge)`
    /// - Invalid TOML or wrong value types → `Err(ConfigError::Parse)`
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as a warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(content) = read_bounded(path, Self::MAX_FILE_SIZE)? else {
            tracing::debug!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config = Self::parse(&content)?;
        tracing::info!(
            path = %path.display(),
            listen_addr = %config.listen_addr,
            cache_ttl_secs = config.cache_ttl_secs,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = content.parse()?;
        table
            .keys()
            .filter(|key| !Self::KNOWN_KEYS.contains(&key.as_str()))
            .for_each(|key| tracing::warn!(key = %key, "Unknown key in config file, ignoring"));

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.default_limit == 0 || self.max_limit == 0 {
            return Err(ConfigError::Invalid(
                "default_limit and max_limit must be at least 1".to_string(),
            ));
        }
        if self.default_limit > self.max_limit {
            return Err(ConfigError::Invalid(format!(
                "default_limit ({}) exceeds max_limit ({})",
                self.default_limit, self.max_limit
            )));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn url_policy(&self) -> UrlPolicy {
        UrlPolicy::from_allow_private(self.allow_private_hosts)
    }
}

/// Reads at most `limit` bytes of `path`; `None` when the file does not exist.
///
/// The size is checked on the opened handle, and the read itself is capped,
/// so a file swapped or grown after opening cannot exceed the limit.
fn read_bounded(path: &Path, limit: u64) -> Result<Option<String>, ConfigError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let too_large = |size: u64| {
        ConfigError::TooLarge(format!(
            "{} is {size} bytes (max {limit} bytes)",
            path.display()
        ))
    };

    let size = file.metadata()?.len();
    if size > limit {
        return Err(too_large(size));
    }

    let mut content = String::new();
    file.take(limit + 1).read_to_string(&mut content)?;
    if content.len() as u64 > limit {
        return Err(too_large(content.len() as u64));
    }
    Ok(Some(content))
}

// ============================================================================
// Tests
// ============================================================================
