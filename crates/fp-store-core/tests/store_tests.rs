//! Integration tests for the FeatureProfileStore public interface.
//!
//! These build a store over a temporary skyline root, lay out window
//! directories the way the anomaly pipeline does, and drive the service.

use async_trait::async_trait;
use fp_store_core::artifacts::layout::{
    created_marker_name, features_file_name, timeseries_file_name, variables_file_name,
};
use fp_store_core::catalog::{feature_table_name, timeseries_table_name};
use fp_store_core::metadata::CreatedMarker;
use fp_store_core::{
    CreationStep, ErrorKind, FeatureProfileStore, GraphRenderer, Result, Scope, Settings, StoreError,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

const TS: i64 = 1_610_000_000;

/// Create a test environment with proper directory structure.
fn create_test_env() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::create_dir_all(temp_dir.path().join("data")).unwrap();
    std::fs::create_dir_all(temp_dir.path().join("features_profiles")).unwrap();
    temp_dir
}

/// Write a training window with features, variables and optionally a timeseries.
fn write_window(root: &TempDir, base_name: &str, timestamp: i64, with_timeseries: bool) -> PathBuf {
    let dir = root
        .path()
        .join("data")
        .join(timestamp.to_string())
        .join(base_name.replace('.', "/"));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(features_file_name(base_name)), "mean,1.23\nvar,0.5\n").unwrap();
    std::fs::write(
        dir.join(variables_file_name(base_name)),
        format!("metric = 'metrics.{}'\nmetric_timestamp = {}\nfull_duration = 86400\n", base_name, timestamp),
    )
    .unwrap();
    if with_timeseries {
        std::fs::write(
            dir.join(timeseries_file_name(base_name)),
            "[[1609913660, 1.0], [1609913720, 2.0], [1609913780, 'bad'], [1609913840, 4.0]]",
        )
        .unwrap();
    }
    dir
}

async fn create_store(root: &TempDir) -> FeatureProfileStore {
    FeatureProfileStore::new(Settings::rooted_at(root.path())).await.unwrap()
}

#[tokio::test]
async fn test_store_creation_fails_for_missing_db_dir() {
    let result = FeatureProfileStore::new(Settings::rooted_at("/nonexistent/path/that/does/not/exist")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_create_profile_end_to_end() {
    let root = create_test_env();
    let dir = write_window(&root, "stats.bar", TS, true);
    let store = create_store(&root).await;
    let metric_id = store.register_metric("metrics.stats.bar").await.unwrap();

    let created = store
        .create_features_profile("metrics.stats.bar", TS, Scope::TrainingData)
        .await
        .unwrap();
    assert!(created.created);
    assert!(!created.already_existed);

    let rows = store.catalog().feature_values(metric_id, created.fp_id).unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r.feature_id).collect();
    assert_eq!(ids, vec![3, 7]);
    assert_eq!(rows[0].value, 1.23);
    assert_eq!(rows[1].value, 0.5);

    let points = store.catalog().timeseries(metric_id, created.fp_id).unwrap();
    let timestamps: Vec<i64> = points.iter().map(|p| p.timestamp).collect();
    assert_eq!(timestamps, vec![1_609_913_660, 1_609_913_720, 1_609_913_840]);

    let metrics = store.list_metrics().await.unwrap();
    assert_eq!(metrics.len(), 1);
    assert!(metrics[0].ionosphere_enabled);

    let marker = CreatedMarker::read(&dir.join(created_marker_name(TS, "stats.bar")))
        .unwrap()
        .unwrap();
    assert_eq!(marker.fp_id, created.fp_id);
    assert_eq!(marker.features_count, 2);

    let details = store.get_details(created.fp_id).await.unwrap();
    assert_eq!(details.metric, "stats.bar");
    assert_eq!(details.features_count, 2);
    assert_eq!(details.full_duration, 86_400);
    assert_eq!(details.last_matched_human, "never matched");

    // The window is copied into the permanent profiles tree.
    let profiles = store
        .resolve_for_metric("metrics.stats.bar", None, Scope::FeaturesProfiles)
        .await
        .unwrap();
    assert_eq!(profiles.unique_timestamps, vec![TS]);
}

#[tokio::test]
async fn test_create_profile_is_idempotent() {
    let root = create_test_env();
    write_window(&root, "stats.bar", TS, true);
    let store = create_store(&root).await;
    let metric_id = store.register_metric("stats.bar").await.unwrap();

    let first = store
        .create_features_profile("stats.bar", TS, Scope::TrainingData)
        .await
        .unwrap();
    let second = store
        .create_features_profile("stats.bar", TS, Scope::TrainingData)
        .await
        .unwrap();

    assert_eq!(first.fp_id, second.fp_id);
    assert!(second.already_existed);
    assert!(!second.created);
    assert_eq!(store.catalog().feature_values(metric_id, first.fp_id).unwrap().len(), 2);
    assert_eq!(store.catalog().timeseries(metric_id, first.fp_id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_concurrent_creation_yields_one_profile() {
    let root = create_test_env();
    write_window(&root, "stats.bar", TS, true);
    let store = Arc::new(create_store(&root).await);
    let metric_id = store.register_metric("stats.bar").await.unwrap();

    let a = {
        let store = store.clone();
        tokio::spawn(async move { store.create_features_profile("stats.bar", TS, Scope::TrainingData).await })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move { store.create_features_profile("stats.bar", TS, Scope::TrainingData).await })
    };
    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert_eq!(a.fp_id, b.fp_id);
    assert_eq!(u32::from(a.created) + u32::from(b.created), 1);
    assert_eq!(store.catalog().feature_values(metric_id, a.fp_id).unwrap().len(), 2);
}

#[tokio::test]
async fn test_retry_after_partial_failure_is_duplicate() {
    let root = create_test_env();
    let dir = write_window(&root, "stats.bar", TS, false);
    let store = create_store(&root).await;
    store.register_metric("stats.bar").await.unwrap();

    let err = store
        .create_features_profile("stats.bar", TS, Scope::TrainingData)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputMissing);
    assert!(err.step().is_some());

    std::fs::write(dir.join(timeseries_file_name("stats.bar")), "[[1609913660, 1.0]]").unwrap();
    let err = store
        .create_features_profile("stats.bar", TS, Scope::TrainingData)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.step(), Some(CreationStep::InsertProfile));
    assert!(err.root_cause().contains("already exists as fp_id"));
}

#[tokio::test]
async fn test_unknown_metric() {
    let root = create_test_env();
    write_window(&root, "stats.unregistered", TS, true);
    let store = create_store(&root).await;

    let err = store
        .create_features_profile("stats.unregistered", TS, Scope::TrainingData)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownMetric);
}

#[tokio::test]
async fn test_tables_reused_across_profiles() {
    let root = create_test_env();
    write_window(&root, "stats.bar", TS, true);
    write_window(&root, "stats.bar", TS + 3600, true);
    let store = create_store(&root).await;
    let metric_id = store.register_metric("stats.bar").await.unwrap();

    let first = store
        .create_features_profile("stats.bar", TS, Scope::TrainingData)
        .await
        .unwrap();
    let second = store
        .create_features_profile("stats.bar", TS + 3600, Scope::TrainingData)
        .await
        .unwrap();

    assert_ne!(first.fp_id, second.fp_id);
    assert!(store.catalog().table_exists(&feature_table_name(metric_id)).unwrap());
    assert!(store.catalog().table_exists(&timeseries_table_name(metric_id)).unwrap());
    assert_eq!(store.catalog().feature_values(metric_id, second.fp_id).unwrap().len(), 2);
}

#[tokio::test]
async fn test_resolve_excludes_redis_aggregates() {
    let root = create_test_env();
    let dir = root.path().join("data").join(TS.to_string()).join("foo");
    std::fs::create_dir_all(&dir).unwrap();
    for name in ["foo.json", "foo.redis.24h.json", "foo.mirage.redis.json"] {
        std::fs::write(dir.join(name), "[]").unwrap();
    }
    let store = create_store(&root).await;

    let resolved = store
        .resolve_by_timestamp(&TS.to_string(), Scope::TrainingData)
        .await
        .unwrap();
    assert_eq!(resolved.unique_metrics, vec!["foo".to_string()]);
    assert_eq!(resolved.unique_timestamps, vec![TS]);
    assert_eq!(resolved.human_dates.len(), 1);
}

#[tokio::test]
async fn test_load_window() {
    let root = create_test_env();
    let dir = write_window(&root, "stats.bar", TS, true);
    std::fs::write(dir.join("stats.bar.png"), b"png").unwrap();
    std::fs::write(dir.join("stats.bar.graphite_now.24h.png"), b"png").unwrap();
    let store = create_store(&root).await;

    let window = store
        .load_window("metrics.stats.bar", TS, Scope::TrainingData)
        .await
        .unwrap();
    assert!(window.data_to_process);
    assert_eq!(window.images, vec![dir.join("stats.bar.png")]);
    assert_eq!(
        window.variables.as_ref().and_then(|v| v.metric()),
        Some("metrics.stats.bar")
    );

    let missing = store.load_window("stats.bar", TS + 1, Scope::TrainingData).await;
    assert!(matches!(missing, Err(StoreError::InputMissing { .. })));
}

#[tokio::test]
async fn test_window_listing_after_creation_omits_lock_file() {
    let root = create_test_env();
    let dir = write_window(&root, "stats.bar", TS, true);
    let store = create_store(&root).await;
    store.register_metric("stats.bar").await.unwrap();
    store
        .create_features_profile("stats.bar", TS, Scope::TrainingData)
        .await
        .unwrap();

    assert!(std::fs::read_dir(&dir)
        .unwrap()
        .any(|e| e.unwrap().file_name().to_string_lossy().ends_with(".fp.lock")));
    let window = store.load_window("stats.bar", TS, Scope::TrainingData).await.unwrap();
    assert!(window.files.iter().all(|f| !f.name.starts_with('.')));
}

#[tokio::test]
async fn test_metric_names_outside_roots_rejected() {
    let root = create_test_env();
    let store = create_store(&root).await;

    for metric in ["/etc/cron", "stats/../../etc", "stats..bar", ".."] {
        let err = store.register_metric(metric).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config, "{}", metric);
    }
    let err = store
        .create_features_profile("stats./tmp", TS, Scope::TrainingData)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    let err = store.load_window("../stats", TS, Scope::TrainingData).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(store.list_metrics().await.unwrap().is_empty());
}

/// Renderer that returns a fixed image for every request.
struct StaticRenderer;

#[async_trait]
impl GraphRenderer for StaticRenderer {
    async fn render_graph(&self, _metric: &str, _from: i64, _until: i64) -> Result<Vec<u8>> {
        Ok(b"\x89PNG".to_vec())
    }
}

#[tokio::test]
async fn test_matched_graphs_written_to_profile_dir() {
    let root = create_test_env();
    write_window(&root, "stats.bar", TS, true);
    let store = FeatureProfileStore::builder(Settings::rooted_at(root.path()))
        .with_renderer(Arc::new(StaticRenderer))
        .build()
        .await
        .unwrap();
    store.register_metric("stats.bar").await.unwrap();
    let created = store
        .create_features_profile("stats.bar", TS, Scope::TrainingData)
        .await
        .unwrap();

    for ts in [TS + 60, TS + 120, TS + 180, TS + 240, TS + 300] {
        store.record_match(created.fp_id, ts).await.unwrap();
    }
    let details = store.get_details(created.fp_id).await.unwrap();
    assert_eq!(details.matched_count, 5);
    assert_eq!(details.last_matched, TS + 300);

    let images = store.fetch_matched_graphs(created.fp_id).await.unwrap();
    assert_eq!(images.len(), 4);
    assert!(images[0].ends_with(format!("stats.bar.matched.fp_id-{}.{}.png", created.fp_id, TS + 300)));
    assert!(images.iter().all(|p| p.exists()));

    // Internal graphs do not show up as operator images.
    let window = store
        .load_window("stats.bar", TS, Scope::FeaturesProfiles)
        .await
        .unwrap();
    assert!(window.images.is_empty());
}
