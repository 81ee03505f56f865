//! Centralized configuration for the feature-profile store.
//!
//! Compile-time constants are grouped the same way as elsewhere in the crate
//! (`PathsConfig`, `NetworkConfig`, `StoreConfig`). Deployment-specific values
//! live in [`Settings`], which is loaded from a JSON file or built in code.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Artifact naming conventions.
pub struct PathsConfig;

impl PathsConfig {
    pub const VARIABLES_SUFFIX: &'static str = ".txt";
    pub const TIMESERIES_SUFFIX: &'static str = ".json";
    pub const FEATURES_SUFFIX: &'static str = ".tsfresh.input.csv.features.transposed.csv";
    pub const CREATED_MARKER_SUFFIX: &'static str = ".fp.created.txt";
    pub const DETAILS_MARKER_SUFFIX: &'static str = ".fp.details.txt";
    pub const LOCK_SUFFIX: &'static str = ".fp.lock";
    pub const IMAGE_EXTENSION: &'static str = "png";
    pub const NOW_GRAPH_TAG: &'static str = ".graphite_now.";
    pub const MATCHED_GRAPH_TAG: &'static str = ".matched.fp_id";
    pub const DATABASE_FILENAME: &'static str = "profiles.sqlite";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const RENDER_TIMEOUT: Duration = Duration::from_secs(10);
    pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);
    pub const USER_AGENT: &'static str = "fp-store/0.1";
}

/// Store behavior constants.
pub struct StoreConfig;

impl StoreConfig {
    /// Sentinel metric name selecting every metric.
    pub const ALL_METRICS: &'static str = "all";
    /// Number of most recent matches that get graphs rendered.
    pub const MATCHED_GRAPHS_LIMIT: usize = 4;
    /// Fixed "now" graph horizons in hours, besides the target horizon.
    pub const NOW_GRAPH_HOURS: [u64; 3] = [24, 168, 720];
    pub const DEFAULT_FULL_DURATION: i64 = 86_400;
    pub const DEFAULT_TARGET_HOURS: u64 = 7;
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
    pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);
    pub const BUSY_TIMEOUT_MS: u64 = 30_000;
    /// Local time with a numeric UTC offset; chrono has no zone abbreviation for `Local`.
    pub const HUMAN_DATE_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S %:z (%A)";
    pub const NEVER_MATCHED: &'static str = "never matched";
    pub const NEVER_CHECKED: &'static str = "never checked";
}

/// How a requested timestamp is matched against artifact directory paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMatch {
    /// The scope-relative directory path contains the timestamp anywhere.
    #[default]
    Substring,
    /// One path segment equals the timestamp exactly.
    Segment,
}

impl TimestampMatch {
    pub fn matches(&self, relative_dir: &Path, timestamp: &str) -> bool {
        match self {
            TimestampMatch::Substring => relative_dir.to_string_lossy().contains(timestamp),
            TimestampMatch::Segment => relative_dir
                .components()
                .any(|c| c.as_os_str().to_string_lossy() == timestamp),
        }
    }
}

/// Basic-auth credentials for the external services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAuth {
    pub user: String,
    pub password: String,
}

/// Runtime settings for a store instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the training-data scope.
    pub data_folder: PathBuf,
    /// Root of the permanent features-profile scope.
    pub profiles_folder: PathBuf,
    /// SQLite catalog location.
    pub database_path: PathBuf,
    /// Default full duration in seconds when a window does not record one.
    pub full_duration: i64,
    /// Target horizon for "now" graphs, in hours.
    pub target_hours: u64,
    /// Prefix stripped from metric names to form base names.
    pub full_namespace: String,
    /// Feature-extraction tool version recorded when no details marker says otherwise.
    pub tool_version: String,
    #[serde(with = "duration_secs")]
    pub lock_timeout: Duration,
    pub timestamp_match: TimestampMatch,
    /// Base URL of the graph render service.
    pub render_url: Option<String>,
    /// Base URL of the anomaly-event lookup service.
    pub lookup_url: Option<String>,
    pub auth: Option<ServiceAuth>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_folder: PathBuf::from("ionosphere/data"),
            profiles_folder: PathBuf::from("ionosphere/features_profiles"),
            database_path: PathBuf::from(PathsConfig::DATABASE_FILENAME),
            full_duration: StoreConfig::DEFAULT_FULL_DURATION,
            target_hours: StoreConfig::DEFAULT_TARGET_HOURS,
            full_namespace: "metrics.".to_string(),
            tool_version: "unknown".to_string(),
            lock_timeout: StoreConfig::DEFAULT_LOCK_TIMEOUT,
            timestamp_match: TimestampMatch::default(),
            render_url: None,
            lookup_url: None,
            auth: None,
        }
    }
}

impl Settings {
    /// Settings rooted in one directory: `data/`, `features_profiles/` and the database.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_folder: root.join("data"),
            profiles_folder: root.join("features_profiles"),
            database_path: root.join(PathsConfig::DATABASE_FILENAME),
            ..Self::default()
        }
    }

    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let settings: Settings = crate::metadata::atomic_read_json(path)?.ok_or_else(|| {
            StoreError::Config {
                message: format!("Settings file not found: {}", path.display()),
            }
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.full_duration <= 0 {
            return Err(StoreError::Config {
                message: format!("full_duration must be positive, got {}", self.full_duration),
            });
        }
        if self.target_hours == 0 {
            return Err(StoreError::Config {
                message: "target_hours must be positive".to_string(),
            });
        }
        if self.data_folder.as_os_str().is_empty() || self.profiles_folder.as_os_str().is_empty() {
            return Err(StoreError::Config {
                message: "data_folder and profiles_folder must be set".to_string(),
            });
        }
        Ok(())
    }

    /// Full duration expressed in whole hours.
    pub fn full_duration_hours(&self) -> i64 {
        self.full_duration / 3600
    }

    /// Strip the namespace prefix once, giving the metric base name.
    pub fn base_name<'a>(&self, metric: &'a str) -> &'a str {
        if self.full_namespace.is_empty() {
            return metric;
        }
        metric.strip_prefix(self.full_namespace.as_str()).unwrap_or(metric)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_base_name_strips_prefix_once() {
        let settings = Settings::default();
        assert_eq!(settings.base_name("metrics.stats.bar"), "stats.bar");
        assert_eq!(settings.base_name("stats.bar"), "stats.bar");
        assert_eq!(settings.base_name("metrics.metrics.x"), "metrics.x");
    }

    #[test]
    fn test_timestamp_match_modes() {
        let dir = Path::new("1000000100/stats/bar");
        assert!(TimestampMatch::Substring.matches(dir, "100"));
        assert!(!TimestampMatch::Segment.matches(dir, "100"));
        assert!(TimestampMatch::Segment.matches(dir, "1000000100"));
    }

    #[test]
    fn test_load_partial_settings_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"full_duration": 604800, "lock_timeout": 5, "timestamp_match": "segment"}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.full_duration, 604_800);
        assert_eq!(settings.full_duration_hours(), 168);
        assert_eq!(settings.lock_timeout, Duration::from_secs(5));
        assert_eq!(settings.timestamp_match, TimestampMatch::Segment);
        assert_eq!(settings.target_hours, StoreConfig::DEFAULT_TARGET_HOURS);
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let settings = Settings {
            full_duration: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(StoreError::Config { .. })));
    }
}
