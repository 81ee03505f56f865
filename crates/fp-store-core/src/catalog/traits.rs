//! Catalog backend trait and row types.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A row of the `metrics` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: i64,
    pub metric: String,
    pub ionosphere_enabled: bool,
}

/// Values for a new feature profile row. Counters start at zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProfile {
    pub metric_id: i64,
    pub requested_timestamp: i64,
    pub full_duration: i64,
    pub tool_version: String,
    pub calc_time: String,
    pub features_count: usize,
    pub features_sum: String,
    pub created_timestamp: i64,
}

/// A stored feature profile joined with its metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: i64,
    pub metric_id: i64,
    pub metric: String,
    pub requested_timestamp: i64,
    pub full_duration: i64,
    pub enabled: bool,
    pub tool_version: String,
    pub calc_time: String,
    pub features_count: i64,
    pub features_sum: String,
    pub deleted: bool,
    pub matched_count: i64,
    pub last_matched: i64,
    pub created_timestamp: i64,
    pub checked_count: i64,
    pub last_checked: i64,
}

/// One mapped feature value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub feature_id: i64,
    pub value: f64,
}

/// One validated timeseries point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub timestamp: i64,
    pub value: f64,
}

/// Relational storage for metrics, profiles and the per-metric tables.
///
/// Per-metric tables are named `feature_values_<metric_id>` and
/// `timeseries_<metric_id>`; the `ensure_*` methods create them at most once.
/// Bulk inserts are all-or-nothing and return the number of rows written.
pub trait CatalogBackend: Send + Sync {
    /// Look up a metric id by name.
    fn metric_id(&self, metric: &str) -> Result<Option<i64>>;

    /// Insert a metric if absent and return its id.
    fn register_metric(&self, metric: &str) -> Result<i64>;

    fn list_metrics(&self) -> Result<Vec<MetricRecord>>;

    fn metric(&self, metric_id: i64) -> Result<Option<MetricRecord>>;

    /// Set `ionosphere_enabled`. Never clears it.
    fn enable_metric(&self, metric_id: i64) -> Result<()>;

    /// Insert a profile row. Fails with `DuplicateProfile` when one already
    /// exists for the same metric and requested timestamp.
    fn insert_profile(&self, profile: &NewProfile) -> Result<i64>;

    fn profile(&self, fp_id: i64) -> Result<Option<ProfileRecord>>;

    /// Create the metric's feature-value table if absent; returns its name.
    fn ensure_feature_table(&self, metric_id: i64) -> Result<String>;

    fn insert_feature_values(&self, metric_id: i64, fp_id: i64, rows: &[FeatureRow]) -> Result<usize>;

    fn feature_values(&self, metric_id: i64, fp_id: i64) -> Result<Vec<FeatureRow>>;

    /// Create the metric's timeseries table if absent; returns its name.
    fn ensure_timeseries_table(&self, metric_id: i64) -> Result<String>;

    fn insert_timeseries(&self, metric_id: i64, fp_id: i64, points: &[TimeseriesPoint]) -> Result<usize>;

    fn timeseries(&self, metric_id: i64, fp_id: i64) -> Result<Vec<TimeseriesPoint>>;

    /// Append a matched event and bump the profile's match counters.
    fn record_match(&self, fp_id: i64, metric_timestamp: i64) -> Result<i64>;

    /// Bump the profile's check counters.
    fn record_check(&self, fp_id: i64, checked_at: i64) -> Result<()>;

    /// Matched-event timestamps of a profile, in insertion order.
    fn matched_timestamps(&self, fp_id: i64) -> Result<Vec<i64>>;

    fn table_exists(&self, name: &str) -> Result<bool>;
}

pub fn feature_table_name(metric_id: i64) -> String {
    format!("feature_values_{}", metric_id)
}

pub fn timeseries_table_name(metric_id: i64) -> String {
    format!("timeseries_{}", metric_id)
}
