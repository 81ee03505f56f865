//! Raw timeseries artifact parsing.

use crate::catalog::TimeseriesPoint;
use crate::error::{Result, StoreError};
use crate::metadata::{parse_literal_list, Literal};
use std::path::Path;
use tracing::warn;

/// Read a `<metric>.json` timeseries. Points that are not a numeric
/// `(timestamp, value)` pair are dropped; order is kept.
pub fn parse_timeseries_file(path: &Path) -> Result<Vec<TimeseriesPoint>> {
    if !path.is_file() {
        return Err(StoreError::InputMissing {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| StoreError::io_with_path(e, path))?;
    parse_timeseries(&contents).map_err(|message| StoreError::parse(path, message))
}

pub fn parse_timeseries(contents: &str) -> std::result::Result<Vec<TimeseriesPoint>, String> {
    let items = parse_literal_list(contents)?;
    let total = items.len();
    let points: Vec<TimeseriesPoint> = items.iter().filter_map(to_point).collect();

    if points.len() < total {
        warn!("Dropped {} malformed datapoints of {}", total - points.len(), total);
    }
    Ok(points)
}

fn to_point(item: &Literal) -> Option<TimeseriesPoint> {
    let pair = item.as_list()?;
    if pair.len() < 2 {
        return None;
    }
    let timestamp = pair[0].as_i64()?;
    let value = pair[1].as_f64().filter(|v| v.is_finite())?;
    Some(TimeseriesPoint { timestamp, value })
}
