//! Configuration types for picsync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Redirect endpoint and resolver retry settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Endpoint that answers with a redirect to a concrete image URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Extra attempts after the first failed request (default: 3)
    #[serde(default = "default_resolver_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff; retry `k` waits `base_delay * 2^k` (default: 1000 ms)
    #[serde(default = "default_base_delay", with = "duration_ms_serde")]
    pub base_delay: Duration,

    /// Add random jitter on top of the backoff delay (default: false)
    #[serde(default)]
    pub jitter: bool,

    /// Transport-level timeout for a single request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_ms_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            max_retries: default_resolver_max_retries(),
            base_delay: default_base_delay(),
            jitter: false,
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Chunking, per-record retry and timeout settings for the batch orchestrator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Records resolved concurrently per chunk (default: 8)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Extra attempts per record after a failed resolution (default: 2)
    #[serde(default = "default_record_max_retries")]
    pub record_max_retries: u32,

    /// Fixed delay between per-record attempts (default: 1000 ms)
    #[serde(default = "default_retry_delay", with = "duration_ms_serde")]
    pub retry_delay: Duration,

    /// Time budget for one per-record attempt (default: 60 seconds)
    ///
    /// The chunk barrier waits at most twice this value.
    #[serde(default = "default_network_timeout", with = "duration_ms_serde")]
    pub network_timeout: Duration,

    /// Time budget for a whole populate run (default: 300 seconds)
    #[serde(default = "default_batch_timeout", with = "duration_ms_serde")]
    pub batch_timeout: Duration,
}

impl BatchConfig {
    /// How long a single chunk may take before its pending records are failed
    pub fn chunk_timeout(&self) -> Duration {
        self.network_timeout * 2
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            record_max_retries: default_record_max_retries(),
            retry_delay: default_retry_delay(),
            network_timeout: default_network_timeout(),
            batch_timeout: default_batch_timeout(),
        }
    }
}

/// Sync task settings (target count and retry envelope)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of records the store holds after a successful pass (default: 140)
    #[serde(default = "default_target_count")]
    pub target_count: usize,

    /// Extra sync attempts after a failed one (default: 1)
    #[serde(default = "default_sync_max_retries")]
    pub max_retries: u32,

    /// Delay before a retry-requested sync is re-run (default: 30 seconds)
    #[serde(default = "default_retry_backoff", with = "duration_ms_serde")]
    pub retry_backoff: Duration,

    /// Interval between scheduled syncs (default: 24 hours)
    #[serde(default = "default_interval", with = "duration_ms_serde")]
    pub interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            max_retries: default_sync_max_retries(),
            retry_backoff: default_retry_backoff(),
            interval: default_interval(),
        }
    }
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./picsync.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for [`SyncService`](crate::SyncService)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Redirect endpoint and resolver retries
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Batch orchestration
    #[serde(default)]
    pub batch: BatchConfig,

    /// Sync task and retry envelope
    #[serde(default)]
    pub sync: SyncConfig,

    /// Record store location
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load and validate a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make a sync pass meaningless
    pub fn validate(&self) -> Result<()> {
        let endpoint = url::Url::parse(&self.resolver.endpoint).map_err(|e| {
            Error::config("resolver.endpoint", format!("invalid endpoint URL: {}", e))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::config(
                "resolver.endpoint",
                format!("unsupported scheme '{}'", endpoint.scheme()),
            ));
        }
        if self.batch.batch_size == 0 {
            return Err(Error::config("batch.batch_size", "must be at least 1"));
        }
        if self.batch.network_timeout.is_zero() {
            return Err(Error::config(
                "batch.network_timeout",
                "must be greater than zero",
            ));
        }
        if self.batch.batch_timeout.is_zero() {
            return Err(Error::config(
                "batch.batch_timeout",
                "must be greater than zero",
            ));
        }
        if self.sync.target_count == 0 {
            return Err(Error::config("sync.target_count", "must be at least 1"));
        }
        if self.sync.interval.is_zero() {
            return Err(Error::config("sync.interval", "must be greater than zero"));
        }
        Ok(())
    }
}

fn default_endpoint() -> String {
    "https://picsum.photos/400/600".to_string()
}

fn default_resolver_max_retries() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("picsync/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_batch_size() -> usize {
    8
}

fn default_record_max_retries() -> u32 {
    2
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_network_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_batch_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_target_count() -> usize {
    140
}

fn default_sync_max_retries() -> u32 {
    1
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_interval() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("picsync.db")
}

// Durations are stored as whole milliseconds
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
