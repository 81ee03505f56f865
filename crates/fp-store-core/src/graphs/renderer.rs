//! Boundary traits for the external graph and anomaly services.

use crate::error::Result;
use async_trait::async_trait;

/// Renders a metric over a time range into image bytes.
#[async_trait]
pub trait GraphRenderer: Send + Sync {
    async fn render_graph(&self, metric: &str, from: i64, until: i64) -> Result<Vec<u8>>;
}

/// Finds the anomaly event recorded for a metric within a time range.
#[async_trait]
pub trait AnomalyLookup: Send + Sync {
    /// `Ok(None)` when the service knows of no such event.
    async fn find_anomaly_event_id(&self, metric: &str, from: i64, until: i64) -> Result<Option<i64>>;
}
