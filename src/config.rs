//! Configuration types for ipd-dl

use crate::error::{Error, Result};
use crate::types::Database;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Default dbfetch endpoint base
pub const DEFAULT_ENDPOINT: &str = "https://www.ebi.ac.uk";

/// Main configuration for [`Harvester`](crate::Harvester)
///
/// The database code, record count and cutoff date have no sensible defaults
/// and must be supplied by the caller (typically from command-line arguments,
/// which are outside this crate). Everything else defaults to the values the
/// production pipeline runs with.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Which IPD database to harvest
    pub database: Database,

    /// Highest record number to probe (scanning may start later when the
    /// index store holds resumption data)
    pub record_count: u32,

    /// Cutoff date in year-month-day form; only records released strictly
    /// after it are written to disk
    pub cutoff: NaiveDate,

    /// Directory holding the per-database index file (default: ".")
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,

    /// Directory record artifacts are written to (default: ".")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Number of concurrent fetch workers (default: 100)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-request timeout applied to every fetch attempt (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Endpoint base URL override (default: the public EBI endpoint)
    ///
    /// Primarily a seam for integration tests that point the harvester at a
    /// local mock server.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Retry tuning for fetch attempts
    #[serde(default)]
    pub retry: RetryConfig,

    /// Retry tuning for index-store lock acquisition
    #[serde(default = "RetryConfig::lock_acquisition")]
    pub lock_retry: RetryConfig,
}

impl HarvestConfig {
    /// Build a configuration with defaults for everything but the required trio
    pub fn new(database: Database, record_count: u32, cutoff: NaiveDate) -> Self {
        Self {
            database,
            record_count,
            cutoff,
            index_dir: default_index_dir(),
            output_dir: default_output_dir(),
            workers: default_workers(),
            request_timeout: default_request_timeout(),
            endpoint: None,
            retry: RetryConfig::default(),
            lock_retry: RetryConfig::lock_acquisition(),
        }
    }

    /// Validate settings that serde cannot enforce
    ///
    /// Called by [`Harvester::new`](crate::Harvester::new); configuration
    /// problems are fatal before any job is generated.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config {
                message: "workers must be at least 1".to_string(),
                key: Some("workers".to_string()),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config {
                message: "request_timeout must be non-zero".to_string(),
                key: Some("request_timeout".to_string()),
            });
        }
        // Surface a bad override here rather than as a per-job URL error later
        self.endpoint_base()?;
        Ok(())
    }

    /// The endpoint base to build job URLs against
    pub fn endpoint_base(&self) -> Result<Url> {
        let base = self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        Url::parse(base).map_err(|e| Error::Config {
            message: format!("invalid endpoint base {base}: {e}"),
            key: Some("endpoint".to_string()),
        })
    }
}

/// Retry configuration for transient failures
///
/// Shared by the two retrying call sites: network fetches and index-store
/// lock acquisition. The default profile reproduces the fetch behavior of the
/// production pipeline — three total attempts with a fixed two-second delay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial try (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before the first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 2 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 1.0 — fixed delay)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Profile for index-store lock acquisition: five total attempts, fixed
    /// two-second delay
    pub fn lock_acquisition() -> Self {
        Self {
            max_attempts: 4,
            ..Self::default()
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_workers() -> usize {
    100
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
