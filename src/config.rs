//! Configuration types for chapter-ingest

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// File storage locations (library and staging)
///
/// Groups settings for where committed chapters live and where extraction
/// output accumulates before commit. Used as a nested sub-config within
/// [`Config`]. The staging directory must be on the same filesystem volume
/// as the library directory so commit renames stay atomic.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StorageConfig {
    /// Final chapter storage root (default: "./library")
    #[serde(default = "default_library_dir")]
    pub library_dir: PathBuf,

    /// Staging area for in-flight extractions (default: "./staging")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            library_dir: default_library_dir(),
            staging_dir: default_staging_dir(),
        }
    }
}

/// Hostile-input ceilings enforced by the extractor
///
/// Any breach of these limits is treated as a resource-exhaustion attempt
/// and aborts the whole upload, not just the offending entry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema)]
pub struct LimitsConfig {
    /// Maximum number of entries in one container (default: 500)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Maximum uncompressed size per entry in bytes (default: 20 MiB)
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,

    /// Maximum cumulative uncompressed size per container in bytes (default: 512 MiB)
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,

    /// Maximum length of an entry filename after sanitization (default: 255)
    #[serde(default = "default_max_filename_len")]
    pub max_filename_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_entry_bytes: default_max_entry_bytes(),
            max_total_bytes: default_max_total_bytes(),
            max_filename_len: default_max_filename_len(),
        }
    }
}

/// Progress tracker lifecycle tuning
///
/// Controls the periodic sweep that keeps leaked background tasks from
/// pinning memory indefinitely. Used as a nested sub-config within [`Config`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressConfig {
    /// Interval between sweep runs in seconds (default: 60)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Entries older than this are purged regardless of state (default: 3600)
    #[serde(default = "default_entry_ttl_secs")]
    pub entry_ttl_secs: u64,

    /// Terminal entries are purged after this grace period (default: 300)
    #[serde(default = "default_terminal_grace_secs")]
    pub terminal_grace_secs: u64,

    /// Entries with no heartbeat for this long are flipped to error (default: 120)
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
}

impl ProgressConfig {
    /// Sweep interval as a Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Entry TTL as a Duration
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs)
    }

    /// Terminal grace period as a Duration
    pub fn terminal_grace(&self) -> Duration {
        Duration::from_secs(self.terminal_grace_secs)
    }

    /// Stall timeout as a Duration
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            entry_ttl_secs: default_entry_ttl_secs(),
            terminal_grace_secs: default_terminal_grace_secs(),
            stall_timeout_secs: default_stall_timeout_secs(),
        }
    }
}

/// REST API server configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Bind address (default: 127.0.0.1:6780)
    #[serde(default = "default_bind_addr")]
    #[schema(value_type = String)]
    pub bind_addr: SocketAddr,

    /// Allowed CORS origins; empty means allow any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Serve interactive Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub enable_swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_origins: Vec::new(),
            enable_swagger_ui: true,
        }
    }
}

/// Main configuration for [`ChapterIngestor`](crate::ChapterIngestor)
///
/// Fields are organized into logical sub-configs:
/// - [`storage`](StorageConfig) — library and staging directories
/// - [`limits`](LimitsConfig) — extraction ceilings
/// - [`progress`](ProgressConfig) — tracker sweep tuning
/// - [`api`](ApiConfig) — REST server settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// File storage locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Extraction ceilings
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Progress tracker tuning
    #[serde(default)]
    pub progress: ProgressConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Path to the sqlite database file (default: "./chapters.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            limits: LimitsConfig::default(),
            progress: ProgressConfig::default(),
            api: ApiConfig::default(),
            database_path: default_database_path(),
        }
    }
}

fn default_library_dir() -> PathBuf {
    PathBuf::from("./library")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./staging")
}

fn default_max_entries() -> usize {
    500
}

fn default_max_entry_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_max_total_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_max_filename_len() -> usize {
    255
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_entry_ttl_secs() -> u64 {
    3600
}

fn default_terminal_grace_secs() -> u64 {
    300
}

fn default_stall_timeout_secs() -> u64 {
    120
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:6780"
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 6780)))
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./chapters.db")
}

fn default_true() -> bool {
    true
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.limits.max_entries, 500);
        assert_eq!(config.limits.max_entry_bytes, 20 * 1024 * 1024);
        assert!(config.limits.max_total_bytes > config.limits.max_entry_bytes);
        assert_eq!(config.progress.stall_timeout_secs, 120);
        assert!(config.api.enable_swagger_ui);
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.storage.library_dir, PathBuf::from("./library"));
        assert_eq!(config.database_path, PathBuf::from("./chapters.db"));
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"limits": {"max_entries": 10}}"#).unwrap();
        assert_eq!(config.limits.max_entries, 10);
        assert_eq!(config.limits.max_filename_len, 255);
    }

    #[test]
    fn progress_durations() {
        let config = ProgressConfig::default();
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.entry_ttl(), Duration::from_secs(3600));
        assert!(config.terminal_grace() < config.entry_ttl());
    }
}
