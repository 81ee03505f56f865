//! Error types for the feature-profile store.
//!
//! Every fallible operation returns [`StoreError`]. The variants carry enough
//! context for an operator-facing message, and [`StoreError::kind`] collapses
//! them onto the small taxonomy callers branch on.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Steps of a feature-profile creation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationStep {
    CheckMarker,
    RequireFeatures,
    ParseFeatures,
    ResolveMetric,
    InsertProfile,
    CreateFeatureTable,
    InsertFeatures,
    CreateTimeseriesTable,
    ParseTimeseries,
    InsertTimeseries,
    WriteMarker,
    EnableMetric,
    CopyArtifacts,
}

impl CreationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreationStep::CheckMarker => "check completion marker",
            CreationStep::RequireFeatures => "locate features file",
            CreationStep::ParseFeatures => "parse features",
            CreationStep::ResolveMetric => "resolve metric id",
            CreationStep::InsertProfile => "insert feature profile",
            CreationStep::CreateFeatureTable => "create feature values table",
            CreationStep::InsertFeatures => "insert feature values",
            CreationStep::CreateTimeseriesTable => "create timeseries table",
            CreationStep::ParseTimeseries => "parse timeseries",
            CreationStep::InsertTimeseries => "insert timeseries",
            CreationStep::WriteMarker => "write completion marker",
            CreationStep::EnableMetric => "enable metric",
            CreationStep::CopyArtifacts => "copy artifacts",
        }
    }
}

impl fmt::Display for CreationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse error classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputMissing,
    ParseError,
    UnknownMetric,
    StorageUnavailable,
    PartialWrite,
    NotFound,
    Conflict,
    Network,
    Config,
    Internal,
}

/// Main error type for the store.
#[derive(Debug, Error)]
pub enum StoreError {
    // Input errors
    #[error("Required input missing: {}", path.display())]
    InputMissing { path: PathBuf },

    #[error("Parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Unknown metric: {metric}")]
    UnknownMetric { metric: String },

    // Storage errors
    #[error("Storage unavailable: {message}")]
    StorageUnavailable {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Partial write to {table}: expected {expected} rows, wrote {written}")]
    PartialWrite {
        table: String,
        expected: usize,
        written: usize,
    },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error(
        "Feature profile for {metric} at {timestamp} already exists as fp_id {existing_fp_id} without a completion marker"
    )]
    DuplicateProfile {
        metric: String,
        timestamp: i64,
        existing_fp_id: i64,
    },

    #[error("Timed out after {waited:?} waiting for lock on {key}")]
    LockTimeout {
        key: String,
        waited: std::time::Duration,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{step} failed: {source}")]
    Step {
        step: CreationStep,
        #[source]
        source: Box<StoreError>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::StorageUnavailable {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout(std::time::Duration::from_secs(0))
        } else {
            StoreError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl StoreError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        StoreError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a parse error for a file.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        StoreError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Attach the creation step this error occurred in.
    ///
    /// Already-tagged errors keep their original step.
    pub fn at_step(self, step: CreationStep) -> Self {
        match self {
            StoreError::Step { .. } => self,
            other => StoreError::Step {
                step,
                source: Box::new(other),
            },
        }
    }

    /// The creation step, if this error came out of the orchestrator.
    pub fn step(&self) -> Option<CreationStep> {
        match self {
            StoreError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Classify the error onto the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InputMissing { .. } => ErrorKind::InputMissing,
            StoreError::Parse { .. } | StoreError::Json { .. } => ErrorKind::ParseError,
            StoreError::UnknownMetric { .. } => ErrorKind::UnknownMetric,
            StoreError::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            StoreError::PartialWrite { .. } => ErrorKind::PartialWrite,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::DuplicateProfile { .. } | StoreError::LockTimeout { .. } => {
                ErrorKind::Conflict
            }
            StoreError::Io { source, .. } => match source {
                Some(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::InputMissing,
                _ => ErrorKind::Internal,
            },
            StoreError::Network { .. } | StoreError::Timeout(_) => ErrorKind::Network,
            StoreError::Config { .. } => ErrorKind::Config,
            StoreError::Step { source, .. } => source.kind(),
            StoreError::Other(_) => ErrorKind::Internal,
        }
    }

    /// The lowest-level cause as a display string.
    pub fn root_cause(&self) -> String {
        let mut current: &dyn std::error::Error = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current.to_string()
    }

    /// Stable process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::InputMissing => 3,
            ErrorKind::ParseError => 4,
            ErrorKind::UnknownMetric => 5,
            ErrorKind::StorageUnavailable => 6,
            ErrorKind::PartialWrite => 7,
            ErrorKind::NotFound => 8,
            ErrorKind::Conflict => 9,
            ErrorKind::Network => 10,
            ErrorKind::Config => 2,
            ErrorKind::Internal => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::UnknownMetric {
            metric: "stats.bar".into(),
        };
        assert_eq!(err.to_string(), "Unknown metric: stats.bar");
    }

    #[test]
    fn test_step_wrapping_keeps_kind_and_cause() {
        let err = StoreError::InputMissing {
            path: PathBuf::from("/tmp/x.csv"),
        }
        .at_step(CreationStep::RequireFeatures);

        assert_eq!(err.step(), Some(CreationStep::RequireFeatures));
        assert_eq!(err.kind(), ErrorKind::InputMissing);
        assert!(err.to_string().starts_with("locate features file failed"));
        assert_eq!(err.root_cause(), "Required input missing: /tmp/x.csv");
    }

    #[test]
    fn test_at_step_does_not_rewrap() {
        let err = StoreError::Other("boom".into())
            .at_step(CreationStep::InsertProfile)
            .at_step(CreationStep::EnableMetric);
        assert_eq!(err.step(), Some(CreationStep::InsertProfile));
    }

    #[test]
    fn test_rusqlite_maps_to_storage_unavailable() {
        let err: StoreError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert_eq!(err.exit_code(), 6);
    }
}
