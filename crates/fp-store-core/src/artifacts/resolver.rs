//! Scans artifact trees for metric/timestamp inventories.

use super::layout::{human_date, ArtifactLayout, Scope};
use crate::config::{PathsConfig, Settings, StoreConfig};
use crate::error::{Result, StoreError};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// One eligible timeseries artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPath {
    pub metric: String,
    pub dir: PathBuf,
    pub timestamp: i64,
}

/// Result of a directory scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedArtifacts {
    pub artifact_paths: Vec<ArtifactPath>,
    /// Deduplicated, ascending.
    pub unique_metrics: Vec<String>,
    /// Deduplicated, ascending.
    pub unique_timestamps: Vec<i64>,
    /// One per entry of `unique_timestamps`.
    pub human_dates: Vec<String>,
}

impl ResolvedArtifacts {
    fn from_paths(artifact_paths: Vec<ArtifactPath>) -> Self {
        let metrics: BTreeSet<&str> = artifact_paths.iter().map(|a| a.metric.as_str()).collect();
        let timestamps: BTreeSet<i64> = artifact_paths.iter().map(|a| a.timestamp).collect();

        let unique_metrics = metrics.into_iter().map(str::to_string).collect();
        let unique_timestamps: Vec<i64> = timestamps.into_iter().collect();
        let human_dates = unique_timestamps.iter().map(|ts| human_date(*ts)).collect();

        Self {
            artifact_paths,
            unique_metrics,
            unique_timestamps,
            human_dates,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.artifact_paths.is_empty()
    }
}

/// Filesystem scanner over the training-data and features-profile trees.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    layout: ArtifactLayout,
    settings: Settings,
    exclude: Regex,
    epoch_dir: Regex,
}

impl DirectoryResolver {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            layout: ArtifactLayout::from_settings(settings),
            settings: settings.clone(),
            exclude: compile(r"(\.redis\.\d+h\.json$)|(mirage\.redis\.json$)")?,
            epoch_dir: compile(r"(^|[^0-9])\d{10}([^0-9]|$)")?,
        })
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Every artifact whose scope-relative directory matches `timestamp`.
    pub fn resolve_by_timestamp(&self, timestamp: &str, scope: Scope) -> ResolvedArtifacts {
        info!("Metrics requested for {} at timestamp {}", scope, timestamp);
        let paths = self
            .scan(scope)
            .into_iter()
            .filter(|(relative, _)| self.settings.timestamp_match.matches(relative, timestamp))
            .map(|(_, artifact)| artifact)
            .collect();
        ResolvedArtifacts::from_paths(paths)
    }

    /// Artifacts of one metric (or all, with [`StoreConfig::ALL_METRICS`]),
    /// optionally narrowed to a timestamp.
    pub fn resolve_for_metric(
        &self,
        metric: &str,
        timestamp: Option<&str>,
        scope: Scope,
    ) -> ResolvedArtifacts {
        let all = metric == StoreConfig::ALL_METRICS;
        let base_name = self.settings.base_name(metric);
        info!(
            "{} data requested for {} at timestamp {:?}",
            scope, base_name, timestamp
        );

        let paths = self
            .scan(scope)
            .into_iter()
            .filter(|(relative, _)| self.epoch_dir.is_match(&relative.to_string_lossy()))
            .filter(|(_, artifact)| all || artifact.metric == base_name)
            .filter(|(relative, _)| match timestamp {
                Some(ts) => self.settings.timestamp_match.matches(relative, ts),
                None => true,
            })
            .map(|(_, artifact)| artifact)
            .collect();
        ResolvedArtifacts::from_paths(paths)
    }

    /// Walk a scope root, yielding (relative dir, artifact) for every eligible file.
    fn scan(&self, scope: Scope) -> Vec<(PathBuf, ArtifactPath)> {
        let root = self.layout.root(scope);
        if !root.is_dir() {
            debug!("Scope root {} does not exist", root.display());
            return Vec::new();
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            let Some(metric) = file_name.strip_suffix(PathsConfig::TIMESERIES_SUFFIX) else {
                continue;
            };
            if self.exclude.is_match(&file_name) {
                debug!("Excluding aggregate artifact {}", entry.path().display());
                continue;
            }
            let Some(dir) = entry.path().parent() else {
                continue;
            };
            let relative = relative_to(dir, root);
            let Some(timestamp) = ArtifactLayout::timestamp_of(scope, &relative) else {
                debug!("No timestamp component in {}", dir.display());
                continue;
            };
            found.push((
                relative,
                ArtifactPath {
                    metric: metric.to_string(),
                    dir: dir.to_path_buf(),
                    timestamp,
                },
            ));
        }
        found
    }
}

fn relative_to(dir: &Path, root: &Path) -> PathBuf {
    dir.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| dir.to_path_buf())
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| StoreError::Other(format!("Invalid pattern {}: {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimestampMatch;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "[]").unwrap();
    }

    fn resolver(root: &Path, mode: TimestampMatch) -> DirectoryResolver {
        let settings = Settings {
            timestamp_match: mode,
            ..Settings::rooted_at(root)
        };
        DirectoryResolver::new(&settings).unwrap()
    }

    #[test]
    fn test_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = resolver(&temp_dir.path().join("absent"), TimestampMatch::Substring);
        assert!(resolver.resolve_by_timestamp("1610000000", Scope::TrainingData).is_empty());
        assert!(resolver
            .resolve_for_metric("all", None, Scope::FeaturesProfiles)
            .is_empty());
    }

    #[test]
    fn test_redis_aggregates_are_excluded() {
        let temp_dir = TempDir::new().unwrap();
        let window = temp_dir.path().join("data/1610000000/stats");
        touch(&window.join("foo.json"));
        touch(&window.join("foo.redis.24h.json"));
        touch(&window.join("foo.mirage.redis.json"));

        let resolved = resolver(temp_dir.path(), TimestampMatch::Substring)
            .resolve_by_timestamp("1610000000", Scope::TrainingData);
        assert_eq!(resolved.unique_metrics, vec!["foo".to_string()]);
        assert_eq!(resolved.artifact_paths.len(), 1);
        assert_eq!(resolved.unique_timestamps, vec![1_610_000_000]);
        assert_eq!(resolved.human_dates.len(), 1);
    }

    #[test]
    fn test_substring_overmatch_and_segment_mode() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("data/1000000100/stats/bar/stats.bar.json"));
        touch(&temp_dir.path().join("data/1000000200/stats/baz/stats.baz.json"));

        // "100" appears inside an unrelated timestamp
        let substring = resolver(temp_dir.path(), TimestampMatch::Substring)
            .resolve_by_timestamp("100", Scope::TrainingData);
        assert_eq!(substring.unique_metrics.len(), 2);

        let segment = resolver(temp_dir.path(), TimestampMatch::Segment)
            .resolve_by_timestamp("100", Scope::TrainingData);
        assert!(segment.is_empty());

        let exact = resolver(temp_dir.path(), TimestampMatch::Segment)
            .resolve_by_timestamp("1000000100", Scope::TrainingData);
        assert_eq!(exact.unique_metrics, vec!["stats.bar".to_string()]);
    }

    #[test]
    fn test_resolve_for_metric_strips_namespace() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("features_profiles/stats/bar/1610000000/stats.bar.json"));
        touch(&temp_dir.path().join("features_profiles/stats/bar/1610005000/stats.bar.json"));
        touch(&temp_dir.path().join("features_profiles/stats/qux/1610000000/stats.qux.json"));

        let resolver = resolver(temp_dir.path(), TimestampMatch::Substring);
        let resolved = resolver.resolve_for_metric("metrics.stats.bar", None, Scope::FeaturesProfiles);
        assert_eq!(resolved.unique_metrics, vec!["stats.bar".to_string()]);
        assert_eq!(resolved.unique_timestamps, vec![1_610_000_000, 1_610_005_000]);

        let one = resolver.resolve_for_metric("stats.bar", Some("1610005000"), Scope::FeaturesProfiles);
        assert_eq!(one.artifact_paths.len(), 1);
        assert_eq!(one.artifact_paths[0].timestamp, 1_610_005_000);

        let all = resolver.resolve_for_metric("all", Some("1610000000"), Scope::FeaturesProfiles);
        assert_eq!(all.unique_metrics, vec!["stats.bar".to_string(), "stats.qux".to_string()]);
    }

    #[test]
    fn test_non_epoch_directories_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("data/123/stats/bar/stats.bar.json"));
        let resolved = resolver(temp_dir.path(), TimestampMatch::Substring)
            .resolve_for_metric("all", None, Scope::TrainingData);
        assert!(resolved.is_empty());
    }
}
