//! Filesystem layout of training windows and feature profiles.
//!
//! ```text
//! <data_root>/<timestamp>/<metric/path>/          training data
//! <profiles_root>/<metric/path>/<timestamp>/      features profiles
//! ```
//!
//! where `<metric/path>` is the base name with dots turned into slashes.

use crate::config::{PathsConfig, Settings, StoreConfig};
use crate::error::StoreError;
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which artifact tree an operation works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    TrainingData,
    FeaturesProfiles,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::TrainingData => "training_data",
            Scope::FeaturesProfiles => "features_profiles",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "training_data" | "training" => Ok(Scope::TrainingData),
            "features_profiles" | "profiles" => Ok(Scope::FeaturesProfiles),
            other => Err(StoreError::Config {
                message: format!("Unknown scope: {}", other),
            }),
        }
    }
}

/// Maps (scope, metric, timestamp) to directories and artifact file names.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    data_root: PathBuf,
    profiles_root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(data_root: impl Into<PathBuf>, profiles_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            profiles_root: profiles_root.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.data_folder, &settings.profiles_folder)
    }

    pub fn root(&self, scope: Scope) -> &Path {
        match scope {
            Scope::TrainingData => &self.data_root,
            Scope::FeaturesProfiles => &self.profiles_root,
        }
    }

    /// `stats.bar` becomes `stats/bar`.
    pub fn metric_path(base_name: &str) -> PathBuf {
        base_name.split('.').filter(|s| !s.is_empty()).collect()
    }

    pub fn window_dir(&self, scope: Scope, base_name: &str, timestamp: i64) -> PathBuf {
        let metric_path = Self::metric_path(base_name);
        match scope {
            Scope::TrainingData => self.data_root.join(timestamp.to_string()).join(metric_path),
            Scope::FeaturesProfiles => self.profiles_root.join(metric_path).join(timestamp.to_string()),
        }
    }

    /// Permanent home of a profile's artifacts.
    pub fn profile_dir(&self, base_name: &str, timestamp: i64) -> PathBuf {
        self.window_dir(Scope::FeaturesProfiles, base_name, timestamp)
    }

    /// Timestamp of an artifact directory, given its path relative to the scope root.
    ///
    /// Training windows carry it as the first component, profiles as the last.
    pub fn timestamp_of(scope: Scope, relative_dir: &Path) -> Option<i64> {
        let component = match scope {
            Scope::TrainingData => relative_dir.components().next(),
            Scope::FeaturesProfiles => relative_dir.components().last(),
        }?;
        component.as_os_str().to_str()?.parse().ok()
    }
}

/// Reject base names that would not map to a directory below a scope root.
///
/// A base name is one or more dot-separated segments, none empty and none
/// containing a path separator or NUL.
pub fn validate_base_name(base_name: &str) -> Result<(), StoreError> {
    let invalid = |reason: &str| {
        Err(StoreError::Config {
            message: format!("Invalid metric name {:?}: {}", base_name, reason),
        })
    };
    if base_name.is_empty() {
        return invalid("empty");
    }
    if base_name.contains(['/', '\\', '\0']) {
        return invalid("contains a path separator");
    }
    if base_name.split('.').any(str::is_empty) {
        return invalid("empty segment");
    }
    Ok(())
}

pub fn variables_file_name(base_name: &str) -> String {
    format!("{}{}", base_name, PathsConfig::VARIABLES_SUFFIX)
}

pub fn timeseries_file_name(base_name: &str) -> String {
    format!("{}{}", base_name, PathsConfig::TIMESERIES_SUFFIX)
}

pub fn features_file_name(base_name: &str) -> String {
    format!("{}{}", base_name, PathsConfig::FEATURES_SUFFIX)
}

pub fn created_marker_name(timestamp: i64, base_name: &str) -> String {
    format!("{}.{}{}", timestamp, base_name, PathsConfig::CREATED_MARKER_SUFFIX)
}

pub fn details_marker_name(timestamp: i64, base_name: &str) -> String {
    format!("{}.{}{}", timestamp, base_name, PathsConfig::DETAILS_MARKER_SUFFIX)
}

pub fn lock_file_name(timestamp: i64, base_name: &str) -> String {
    format!(".{}.{}{}", timestamp, base_name, PathsConfig::LOCK_SUFFIX)
}

pub fn now_graph_name(base_name: &str, hours: u64) -> String {
    format!(
        "{}{}{}h.{}",
        base_name,
        PathsConfig::NOW_GRAPH_TAG,
        hours,
        PathsConfig::IMAGE_EXTENSION
    )
}

pub fn matched_graph_name(base_name: &str, fp_id: i64, timestamp: i64) -> String {
    format!(
        "{}{}-{}.{}.{}",
        base_name,
        PathsConfig::MATCHED_GRAPH_TAG,
        fp_id,
        timestamp,
        PathsConfig::IMAGE_EXTENSION
    )
}

/// Render an epoch in local time with its UTC offset, e.g. `2021-01-07 06:13:20 +00:00 (Thursday)`.
pub fn human_date(epoch: i64) -> String {
    match Local.timestamp_opt(epoch, 0).single() {
        Some(dt) => dt.format(StoreConfig::HUMAN_DATE_FORMAT).to_string(),
        None => epoch.to_string(),
    }
}
