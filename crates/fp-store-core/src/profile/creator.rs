//! Feature-profile creation.
//!
//! A creation request runs a fixed sequence of steps against one window:
//!
//! 1. Return early if the window already carries a completion marker.
//! 2. Take the window lock and check the marker again.
//! 3. Parse the features file and resolve the metric.
//! 4. Insert the profile row, then its feature values and source timeseries
//!    into the metric's own tables (created on first use).
//! 5. Write the completion marker, enable the metric and copy the window's
//!    files into the permanent profile directory.
//!
//! Every failure is tagged with the [`CreationStep`] it happened in. Steps are
//! not rolled back; the catalog's uniqueness constraint turns a retry after a
//! mid-way failure into [`StoreError::DuplicateProfile`].

use super::features::{parse_features_file, FeatureDictionary};
use super::lock::WindowLock;
use super::timeseries::parse_timeseries_file;
use crate::artifacts::layout::{
    created_marker_name, details_marker_name, features_file_name, lock_file_name,
    timeseries_file_name, validate_base_name, variables_file_name,
};
use crate::artifacts::{list_files, ArtifactLayout, Scope};
use crate::catalog::{CatalogBackend, NewProfile};
use crate::config::Settings;
use crate::error::{CreationStep, Result, StoreError};
use crate::metadata::{CreatedMarker, DetailsMarker, MetricVariables, MARKER_FORMAT_VERSION};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of a creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreatedProfile {
    pub fp_id: i64,
    /// This request inserted the profile.
    pub created: bool,
    /// The profile was already complete when the request ran.
    pub already_existed: bool,
}

impl CreatedProfile {
    fn existing(fp_id: i64) -> Self {
        Self {
            fp_id,
            created: false,
            already_existed: true,
        }
    }
}

/// Runs creation requests against one catalog and artifact layout.
#[derive(Clone)]
pub struct FeatureProfileCreator {
    catalog: Arc<dyn CatalogBackend>,
    layout: ArtifactLayout,
    settings: Arc<Settings>,
    dictionary: Arc<FeatureDictionary>,
}

/// Tag a step failure and log it.
fn at<T>(step: CreationStep, result: Result<T>) -> Result<T> {
    result.map_err(|e| {
        let e = e.at_step(step);
        error!("{}", e);
        e
    })
}

impl FeatureProfileCreator {
    pub fn new(
        catalog: Arc<dyn CatalogBackend>,
        layout: ArtifactLayout,
        settings: Arc<Settings>,
        dictionary: Arc<FeatureDictionary>,
    ) -> Self {
        Self {
            catalog,
            layout,
            settings,
            dictionary,
        }
    }

    /// Create the feature profile for `base_name` at `timestamp` from the
    /// window in `scope`, or return the existing one.
    pub fn create(&self, base_name: &str, timestamp: i64, scope: Scope) -> Result<CreatedProfile> {
        validate_base_name(base_name)?;
        let dir = self.layout.window_dir(scope, base_name, timestamp);
        let marker_path = dir.join(created_marker_name(timestamp, base_name));
        info!("Feature profile requested for {} at {} ({})", base_name, timestamp, scope);

        if let Some(marker) = at(CreationStep::CheckMarker, CreatedMarker::read(&marker_path))? {
            info!("fp_id {} already exists for {} at {}", marker.fp_id, base_name, timestamp);
            return Ok(CreatedProfile::existing(marker.fp_id));
        }

        let features_path = dir.join(features_file_name(base_name));
        if !dir.is_dir() {
            return at(
                CreationStep::RequireFeatures,
                Err(StoreError::InputMissing {
                    path: features_path,
                }),
            );
        }

        let _lock = at(
            CreationStep::CheckMarker,
            WindowLock::acquire(&dir.join(lock_file_name(timestamp, base_name)), self.settings.lock_timeout),
        )?;
        if let Some(marker) = at(CreationStep::CheckMarker, CreatedMarker::read(&marker_path))? {
            info!(
                "fp_id {} was created for {} at {} while waiting for the window lock",
                marker.fp_id, base_name, timestamp
            );
            return Ok(CreatedProfile::existing(marker.fp_id));
        }

        // S1
        if !features_path.is_file() {
            return at(
                CreationStep::RequireFeatures,
                Err(StoreError::InputMissing {
                    path: features_path,
                }),
            );
        }
        info!("Features file exists: {}", features_path.display());

        let summary = self.summary_fields(&dir, base_name, timestamp);

        // S2
        let features = at(
            CreationStep::ParseFeatures,
            parse_features_file(&features_path, &self.dictionary),
        )?;
        if let Some(count) = summary.details_count {
            if count != features.count() {
                warn!(
                    "Details marker records {} features but {} were mapped for {}",
                    count,
                    features.count(),
                    base_name
                );
            }
        }

        // S3
        let metric_id = at(
            CreationStep::ResolveMetric,
            self.catalog.metric_id(base_name).and_then(|id| {
                id.ok_or_else(|| StoreError::UnknownMetric {
                    metric: base_name.to_string(),
                })
            }),
        )?;
        info!("Determined metric id {} for {}", metric_id, base_name);

        // S4
        let new_profile = NewProfile {
            metric_id,
            requested_timestamp: timestamp,
            full_duration: summary.full_duration,
            tool_version: summary.tool_version.clone(),
            calc_time: summary.calc_time.clone(),
            features_count: features.count(),
            features_sum: features.sum.to_string(),
            created_timestamp: Utc::now().timestamp(),
        };
        let fp_id = at(CreationStep::InsertProfile, self.catalog.insert_profile(&new_profile))?;
        info!("New fp_id {} for {} at {}", fp_id, base_name, timestamp);

        // S5, S6
        let fp_table = at(
            CreationStep::CreateFeatureTable,
            self.catalog.ensure_feature_table(metric_id),
        )?;
        let written = at(
            CreationStep::InsertFeatures,
            self.catalog
                .insert_feature_values(metric_id, fp_id, &features.rows)
                .and_then(|written| expect_rows(&fp_table, features.count(), written)),
        )?;
        info!("fp_id {} - {} feature values inserted into {}", fp_id, written, fp_table);

        // S7, S8, S9
        let ts_table = at(
            CreationStep::CreateTimeseriesTable,
            self.catalog.ensure_timeseries_table(metric_id),
        )?;
        let points = at(
            CreationStep::ParseTimeseries,
            parse_timeseries_file(&dir.join(timeseries_file_name(base_name))),
        )?;
        let written = at(
            CreationStep::InsertTimeseries,
            self.catalog
                .insert_timeseries(metric_id, fp_id, &points)
                .and_then(|written| expect_rows(&ts_table, points.len(), written)),
        )?;
        info!("fp_id {} - {} timeseries points inserted into {}", fp_id, written, ts_table);

        // S10
        let marker = CreatedMarker {
            format_version: MARKER_FORMAT_VERSION,
            fp_id,
            created_timestamp: new_profile.created_timestamp,
            tool_version: new_profile.tool_version.clone(),
            calc_time: new_profile.calc_time.clone(),
            features_count: features.count(),
            features_sum: features.sum,
            full_duration: new_profile.full_duration,
        };
        at(CreationStep::WriteMarker, marker.write(&marker_path))?;

        // S11
        at(CreationStep::EnableMetric, self.catalog.enable_metric(metric_id))?;
        info!("ionosphere_enabled set on metric id {}", metric_id);

        // S12
        let profile_dir = self.layout.profile_dir(base_name, timestamp);
        if profile_dir != dir {
            copy_window(fp_id, &dir, &profile_dir);
        }

        Ok(CreatedProfile {
            fp_id,
            created: true,
            already_existed: false,
        })
    }

    /// Summary fields from the details marker, falling back to the variables
    /// file and then to settings.
    fn summary_fields(&self, dir: &Path, base_name: &str, timestamp: i64) -> SummaryFields {
        let details_path = dir.join(details_marker_name(timestamp, base_name));
        let details = match DetailsMarker::read(&details_path) {
            Ok(details) => details,
            Err(e) => {
                warn!("Ignoring unreadable details marker {}: {}", details_path.display(), e);
                None
            }
        };

        let full_duration = details
            .as_ref()
            .and_then(|d| d.full_duration)
            .or_else(|| {
                MetricVariables::from_file(&dir.join(variables_file_name(base_name)))
                    .ok()
                    .and_then(|vars| vars.full_duration())
            })
            .unwrap_or(self.settings.full_duration);

        match details {
            Some(d) => SummaryFields {
                tool_version: d.tool_version,
                calc_time: d.calc_time,
                full_duration,
                details_count: Some(d.features_count),
            },
            None => SummaryFields {
                tool_version: self.settings.tool_version.clone(),
                calc_time: String::new(),
                full_duration,
                details_count: None,
            },
        }
    }
}

struct SummaryFields {
    tool_version: String,
    calc_time: String,
    full_duration: i64,
    details_count: Option<usize>,
}

fn expect_rows(table: &str, expected: usize, written: usize) -> Result<usize> {
    if written != expected {
        return Err(StoreError::PartialWrite {
            table: table.to_string(),
            expected,
            written,
        });
    }
    Ok(written)
}

/// Best-effort copy of a window's files into the profile directory.
fn copy_window(fp_id: i64, from: &Path, to: &Path) {
    if let Err(e) = fs::create_dir_all(to) {
        warn!("fp_id {} - could not create {}: {}", fp_id, to.display(), e);
        return;
    }
    let files = match list_files(from) {
        Ok(files) => files,
        Err(e) => {
            warn!("fp_id {} - training data not copied to {}: {}", fp_id, to.display(), e);
            return;
        }
    };

    let mut copied = 0usize;
    for file in &files {
        match fs::copy(&file.path, to.join(&file.name)) {
            Ok(_) => {
                debug!("fp_id {} - copied {}", fp_id, file.path.display());
                copied += 1;
            }
            Err(e) => warn!("fp_id {} - failed to copy {}: {}", fp_id, file.path.display(), e),
        }
    }
    info!("fp_id {} - {} training data files copied to {}", fp_id, copied, to.display());
}
