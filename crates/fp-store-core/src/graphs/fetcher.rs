//! Renders "now" and matched-event graphs into a window directory.
//!
//! All outcomes are advisory: failures are logged and the affected image is
//! skipped.

use super::renderer::{AnomalyLookup, GraphRenderer};
use crate::artifacts::layout::{matched_graph_name, now_graph_name};
use crate::catalog::CatalogBackend;
use crate::config::StoreConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct MatchedGraphFetcher {
    catalog: Arc<dyn CatalogBackend>,
    renderer: Option<Arc<dyn GraphRenderer>>,
    lookup: Option<Arc<dyn AnomalyLookup>>,
    target_hours: u64,
}

impl MatchedGraphFetcher {
    pub fn new(
        catalog: Arc<dyn CatalogBackend>,
        renderer: Option<Arc<dyn GraphRenderer>>,
        lookup: Option<Arc<dyn AnomalyLookup>>,
        target_hours: u64,
    ) -> Self {
        Self {
            catalog,
            renderer,
            lookup,
            target_hours,
        }
    }

    /// Graph horizons in hours: the target plus the fixed set, deduplicated and ascending.
    pub fn now_horizons(&self) -> Vec<u64> {
        let mut hours: Vec<u64> = std::iter::once(self.target_hours)
            .chain(StoreConfig::NOW_GRAPH_HOURS)
            .collect();
        hours.sort_unstable();
        hours.dedup();
        hours
    }

    /// Render the profile's most recent matches, newest first.
    pub async fn fetch_matched_graphs(
        &self,
        fp_id: i64,
        base_name: &str,
        full_duration: i64,
        dir: &Path,
    ) -> Vec<PathBuf> {
        let Some(renderer) = &self.renderer else {
            debug!("No graph renderer configured, skipping matched graphs for fp_id {}", fp_id);
            return Vec::new();
        };

        let catalog = self.catalog.clone();
        let mut timestamps = match crate::blocking(move || catalog.matched_timestamps(fp_id)).await {
            Ok(timestamps) => timestamps,
            Err(e) => {
                warn!("Could not determine matched timestamps for fp_id {}: {}", fp_id, e);
                return Vec::new();
            }
        };
        info!("Determined {} matched timestamps for fp_id {}", timestamps.len(), fp_id);

        timestamps.sort_unstable_by(|a, b| b.cmp(a));
        timestamps.truncate(StoreConfig::MATCHED_GRAPHS_LIMIT);

        let mut images = Vec::new();
        for ts in timestamps {
            let path = dir.join(matched_graph_name(base_name, fp_id, ts));
            if render_to(renderer.as_ref(), base_name, ts - full_duration, ts, &path).await {
                images.push(path);
            }
        }
        images
    }

    /// Render graphs ending at `now` for every horizon, replacing stale ones.
    pub async fn fetch_now_graphs(&self, base_name: &str, dir: &Path, now: i64) -> Vec<PathBuf> {
        let Some(renderer) = &self.renderer else {
            debug!("No graph renderer configured, skipping now graphs for {}", base_name);
            return Vec::new();
        };

        let mut images = Vec::new();
        for hours in self.now_horizons() {
            let path = dir.join(now_graph_name(base_name, hours));
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Removed stale graph {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove stale graph {}: {}", path.display(), e),
            }
            let from = now - (hours as i64) * 3600;
            if render_to(renderer.as_ref(), base_name, from, now, &path).await {
                images.push(path);
            }
        }
        images
    }

    /// Anomaly event id for the range, `None` on absence or any failure.
    pub async fn find_anomaly_event_id(&self, metric: &str, from: i64, until: i64) -> Option<i64> {
        let lookup = self.lookup.as_ref()?;
        match lookup.find_anomaly_event_id(metric, from, until).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to get anomaly id for {}: {}", metric, e);
                None
            }
        }
    }
}

async fn render_to(renderer: &dyn GraphRenderer, metric: &str, from: i64, until: i64, path: &Path) -> bool {
    info!("Getting graph for {} from {} until {}", metric, from, until);
    let bytes = match renderer.render_graph(metric, from, until).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to render graph for {} at {}: {}", metric, until, e);
            return false;
        }
    };
    match tokio::fs::write(path, &bytes).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to write graph {}: {}", path.display(), e);
            false
        }
    }
}
