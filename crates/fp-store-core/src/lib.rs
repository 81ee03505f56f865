//! FP Store Core - Headless library for time-series anomaly feature profiles.
//!
//! This crate resolves the artifact directories written by the anomaly
//! pipeline, parses the per-window metadata, and turns a window's extracted
//! features and raw timeseries into durable catalog rows. It can be used
//! programmatically without any HTTP layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use fp_store_core::{FeatureProfileStore, Scope, Settings};
//!
//! #[tokio::main]
//! async fn main() -> fp_store_core::Result<()> {
//!     let store = FeatureProfileStore::builder(Settings::rooted_at("/opt/skyline"))
//!         .auto_create_dirs(true)
//!         .build()
//!         .await?;
//!
//!     let created = store
//!         .create_features_profile("metrics.stats.bar", 1610000000, Scope::TrainingData)
//!         .await?;
//!     println!("fp_id {}", created.fp_id);
//!
//!     Ok(())
//! }
//! ```

pub mod artifacts;
pub mod catalog;
pub mod config;
pub mod error;
pub mod graphs;
pub mod metadata;
pub mod profile;

mod api;

pub use artifacts::{ArtifactLayout, ArtifactPath, DirectoryResolver, ResolvedArtifacts, Scope, WindowArtifacts};
pub use catalog::{CatalogBackend, MetricRecord, SqliteCatalog};
pub use config::{ServiceAuth, Settings, TimestampMatch};
pub use error::{CreationStep, ErrorKind, Result, StoreError};
pub use graphs::{AnomalyLookup, GraphRenderer, HttpAnomalyLookup, HttpGraphRenderer, MatchedGraphFetcher};
pub use metadata::MetricVariables;
pub use profile::{CreatedProfile, FeatureDictionary, FeatureProfileCreator, ProfileDetails};

pub use api::FeatureProfileStoreBuilder;

use artifacts::layout::validate_base_name;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Main service object for feature-profile operations.
///
/// Owns the settings, the catalog connection and the graph collaborators.
/// Filesystem and catalog work runs on tokio's blocking pool; each call is
/// request-scoped and independent of every other.
pub struct FeatureProfileStore {
    settings: Arc<Settings>,
    catalog: Arc<dyn CatalogBackend>,
    resolver: Arc<DirectoryResolver>,
    creator: FeatureProfileCreator,
    graphs: MatchedGraphFetcher,
}

impl FeatureProfileStore {
    /// Create a builder for the given settings.
    pub fn builder(settings: Settings) -> FeatureProfileStoreBuilder {
        FeatureProfileStoreBuilder::new(settings)
    }

    /// Create a store with default options (directories must exist).
    pub async fn new(settings: Settings) -> Result<Self> {
        Self::builder(settings).build().await
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogBackend> {
        &self.catalog
    }

    pub fn layout(&self) -> &ArtifactLayout {
        self.resolver.layout()
    }

    /// Namespace-stripped base name, rejected if it cannot name a window directory.
    fn checked_base_name(&self, metric: &str) -> Result<String> {
        let base_name = self.settings.base_name(metric);
        validate_base_name(base_name)?;
        Ok(base_name.to_string())
    }

    // ========================================
    // Artifact resolution
    // ========================================

    /// Every artifact whose directory matches `timestamp` in `scope`.
    pub async fn resolve_by_timestamp(&self, timestamp: &str, scope: Scope) -> Result<ResolvedArtifacts> {
        let resolver = self.resolver.clone();
        let timestamp = timestamp.to_string();
        blocking(move || Ok(resolver.resolve_by_timestamp(&timestamp, scope))).await
    }

    /// Artifacts for one metric (or `"all"`), optionally narrowed to a timestamp.
    pub async fn resolve_for_metric(
        &self,
        metric: &str,
        timestamp: Option<&str>,
        scope: Scope,
    ) -> Result<ResolvedArtifacts> {
        let resolver = self.resolver.clone();
        let metric = metric.to_string();
        let timestamp = timestamp.map(str::to_string);
        blocking(move || Ok(resolver.resolve_for_metric(&metric, timestamp.as_deref(), scope))).await
    }

    /// List and load one window directory.
    pub async fn load_window(&self, metric: &str, timestamp: i64, scope: Scope) -> Result<WindowArtifacts> {
        let layout = self.layout().clone();
        let base_name = self.checked_base_name(metric)?;
        blocking(move || WindowArtifacts::load(&layout, &base_name, timestamp, scope)).await
    }

    /// Parse a metric variables file.
    pub async fn parse_variables(&self, path: impl AsRef<Path>) -> Result<MetricVariables> {
        let path = path.as_ref().to_path_buf();
        blocking(move || MetricVariables::from_file(&path)).await
    }

    // ========================================
    // Feature profiles
    // ========================================

    /// Create the feature profile for a window, or return the existing one.
    pub async fn create_features_profile(
        &self,
        metric: &str,
        timestamp: i64,
        scope: Scope,
    ) -> Result<CreatedProfile> {
        let creator = self.creator.clone();
        let base_name = self.checked_base_name(metric)?;
        let created = blocking(move || creator.create(&base_name, timestamp, scope)).await?;
        info!(
            "Feature profile {} for {} at {} (created: {})",
            created.fp_id, metric, timestamp, created.created
        );
        Ok(created)
    }

    pub async fn get_details(&self, fp_id: i64) -> Result<ProfileDetails> {
        let catalog = self.catalog.clone();
        blocking(move || profile::get_details(catalog.as_ref(), fp_id)).await
    }

    /// Append a matched event and bump the profile's match counters.
    pub async fn record_match(&self, fp_id: i64, metric_timestamp: i64) -> Result<i64> {
        let catalog = self.catalog.clone();
        blocking(move || catalog.record_match(fp_id, metric_timestamp)).await
    }

    /// Bump the profile's check counters.
    pub async fn record_check(&self, fp_id: i64, checked_at: i64) -> Result<()> {
        let catalog = self.catalog.clone();
        blocking(move || catalog.record_check(fp_id, checked_at)).await
    }

    // ========================================
    // Metrics
    // ========================================

    /// Register a metric by its base name, returning its id.
    pub async fn register_metric(&self, metric: &str) -> Result<i64> {
        let catalog = self.catalog.clone();
        let base_name = self.checked_base_name(metric)?;
        blocking(move || catalog.register_metric(&base_name)).await
    }

    pub async fn list_metrics(&self) -> Result<Vec<MetricRecord>> {
        let catalog = self.catalog.clone();
        blocking(move || catalog.list_metrics()).await
    }

    // ========================================
    // Graphs
    // ========================================

    /// Render the most recent matches of a profile into its profile directory.
    pub async fn fetch_matched_graphs(&self, fp_id: i64) -> Result<Vec<PathBuf>> {
        let details = self.get_details(fp_id).await?;
        validate_base_name(&details.metric)?;
        let dir = self.layout().profile_dir(&details.metric, details.requested_timestamp);
        Ok(self
            .graphs
            .fetch_matched_graphs(fp_id, &details.metric, details.full_duration, &dir)
            .await)
    }

    /// Render "now" graphs for a metric into a window directory.
    pub async fn fetch_now_graphs(&self, metric: &str, timestamp: i64, scope: Scope) -> Result<Vec<PathBuf>> {
        let base_name = self.checked_base_name(metric)?;
        let dir = self.layout().window_dir(scope, &base_name, timestamp);
        if !dir.is_dir() {
            return Err(StoreError::InputMissing { path: dir });
        }
        let now = chrono::Utc::now().timestamp();
        Ok(self.graphs.fetch_now_graphs(&base_name, &dir, now).await)
    }

    /// Anomaly event id for a metric and range; `None` when absent or unavailable.
    pub async fn find_anomaly_event_id(&self, metric: &str, from: i64, until: i64) -> Option<i64> {
        self.graphs.find_anomaly_event_id(metric, from, until).await
    }
}

/// Run synchronous store work on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Other(format!("Blocking task failed: {}", e)))?
}
