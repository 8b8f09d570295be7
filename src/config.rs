//! Configuration types for media-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Scheduler behavior configuration (concurrency, admission, shutdown)
///
/// Groups settings for the worker pool and queue admission control.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum concurrent downloads (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Maximum pending requests before admission control rejects (default: 50)
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// How long `stop()` waits for workers to drain (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            max_queue_size: default_max_queue_size(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Admission limits applied after metadata resolution (None = unlimited)
///
/// The worker fails a task whose resolved size or duration exceeds these
/// limits before any bytes are transferred.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum artifact size in bytes
    #[serde(default)]
    pub max_file_size_bytes: Option<u64>,

    /// Maximum media duration in seconds
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
}

/// Retry configuration for fetch engine calls
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Workspace janitor configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Age after which abandoned workspaces are reclaimed (default: 1 hour)
    #[serde(default = "default_stale_max_age", with = "duration_serde")]
    pub stale_max_age: Duration,

    /// Run a stale-workspace sweep before each new download (default: true)
    #[serde(default = "default_true")]
    pub auto_clean: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            stale_max_age: default_stale_max_age(),
            auto_clean: true,
        }
    }
}

/// Main configuration for [`MediaDownloader`](crate::MediaDownloader)
///
/// Fields are organized into logical sub-configs:
/// - [`scheduler`](SchedulerConfig) — concurrency, admission, shutdown
/// - [`limits`](LimitsConfig) — size/duration admission limits
/// - [`retry`](RetryConfig) — fetch retry policy
/// - [`cleanup`](CleanupConfig) — workspace janitor
///
/// Sub-config fields are flattened for serialization, so the JSON/TOML
/// format remains flat (no nesting).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Directory for completed artifacts (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Directory for per-task workspaces (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Scheduler behavior settings
    #[serde(flatten)]
    pub scheduler: SchedulerConfig,

    /// Size/duration admission limits
    #[serde(flatten)]
    pub limits: LimitsConfig,

    /// Retry policy for fetch engine calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Workspace janitor settings
    #[serde(flatten)]
    pub cleanup: CleanupConfig,

    /// Cookie jar copied into each workspace when set (e.g. an exported
    /// browser session, or a secrets-mount path in hosted deployments)
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
            scheduler: SchedulerConfig::default(),
            limits: LimitsConfig::default(),
            retry: RetryConfig::default(),
            cleanup: CleanupConfig::default(),
            cookie_file: None,
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_queue_size() -> usize {
    50
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_stale_max_age() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_true() -> bool {
    true
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
