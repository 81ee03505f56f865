//! Completion and details marker records.
//!
//! Markers are written as versioned JSON objects. Older windows carry the
//! bracketed literal-list form, which is still read.

use super::atomic::{atomic_write_json, read_text};
use super::literal::{parse_literal_list, Literal};
use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current marker format version.
pub const MARKER_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    MARKER_FORMAT_VERSION
}

/// Proof that a feature profile was fully created for a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedMarker {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub fp_id: i64,
    pub created_timestamp: i64,
    pub tool_version: String,
    #[serde(default)]
    pub calc_time: String,
    pub features_count: usize,
    pub features_sum: f64,
    pub full_duration: i64,
}

/// Feature-extraction details left by the external extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailsMarker {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub created_timestamp: i64,
    pub tool_version: String,
    #[serde(default)]
    pub calc_time: String,
    pub features_count: usize,
    pub features_sum: f64,
    #[serde(default)]
    pub full_duration: Option<i64>,
}

impl CreatedMarker {
    /// Read a marker, `None` when the file is absent.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let Some(text) = read_text(path)? else {
            return Ok(None);
        };
        let marker = if text.trim_start().starts_with('{') {
            serde_json::from_str(&text).map_err(|e| StoreError::parse(path, e.to_string()))?
        } else {
            Self::from_legacy(&text).map_err(|message| StoreError::parse(path, message))?
        };
        Ok(Some(marker))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self)
    }

    /// `[fp_id, created_epoch, 'tool_version', calc_time, count, sum, full_duration]`
    fn from_legacy(text: &str) -> std::result::Result<Self, String> {
        let items = parse_literal_list(text)?;
        let fp_id = items
            .first()
            .and_then(Literal::as_i64)
            .ok_or("legacy marker has no fp_id")?;
        Ok(Self {
            format_version: 0,
            fp_id,
            created_timestamp: int_at(&items, 1).unwrap_or(0),
            tool_version: str_at(&items, 2),
            calc_time: str_at(&items, 3),
            features_count: int_at(&items, 4).unwrap_or(0).max(0) as usize,
            features_sum: items.get(5).and_then(Literal::as_f64).unwrap_or(0.0),
            full_duration: int_at(&items, 6).unwrap_or(0),
        })
    }
}

impl DetailsMarker {
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let Some(text) = read_text(path)? else {
            return Ok(None);
        };
        let marker = if text.trim_start().starts_with('{') {
            serde_json::from_str(&text).map_err(|e| StoreError::parse(path, e.to_string()))?
        } else {
            Self::from_legacy(&text).map_err(|message| StoreError::parse(path, message))?
        };
        Ok(Some(marker))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self)
    }

    /// `[created_epoch, tool_version, calc_time, count, sum, full_duration?]`
    fn from_legacy(text: &str) -> std::result::Result<Self, String> {
        let items = parse_literal_list(text)?;
        if items.len() < 5 {
            return Err(format!(
                "legacy details marker needs at least 5 fields, found {}",
                items.len()
            ));
        }
        Ok(Self {
            format_version: 0,
            created_timestamp: int_at(&items, 0).unwrap_or(0),
            tool_version: str_at(&items, 1),
            calc_time: str_at(&items, 2),
            features_count: int_at(&items, 3).unwrap_or(0).max(0) as usize,
            features_sum: items.get(4).and_then(Literal::as_f64).unwrap_or(0.0),
            full_duration: int_at(&items, 5).filter(|d| *d > 0),
        })
    }
}

fn int_at(items: &[Literal], idx: usize) -> Option<i64> {
    items.get(idx).and_then(Literal::as_i64)
}

fn str_at(items: &[Literal], idx: usize) -> String {
    items.get(idx).map(|l| l.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_created_marker_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("1610000000.stats.bar.fp.created.txt");
        let marker = CreatedMarker {
            format_version: MARKER_FORMAT_VERSION,
            fp_id: 7,
            created_timestamp: 1_610_000_500,
            tool_version: "0.4.0".into(),
            calc_time: "2.1".into(),
            features_count: 2,
            features_sum: 1.73,
            full_duration: 86_400,
        };
        marker.write(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"format_version\": 1"));
        assert_eq!(CreatedMarker::read(&path).unwrap(), Some(marker));
    }

    #[test]
    fn test_legacy_created_marker() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("legacy.fp.created.txt");
        std::fs::write(&path, "[12, 1610000500, '0.4.0', 2.1, 210, 7390.2, 86400]").unwrap();

        let marker = CreatedMarker::read(&path).unwrap().unwrap();
        assert_eq!(marker.format_version, 0);
        assert_eq!(marker.fp_id, 12);
        assert_eq!(marker.tool_version, "0.4.0");
        assert_eq!(marker.calc_time, "2.1");
        assert_eq!(marker.features_count, 210);
        assert_eq!(marker.full_duration, 86_400);
    }

    #[test]
    fn test_legacy_details_without_full_duration() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("legacy.fp.details.txt");
        std::fs::write(&path, "[1610000400, '0.4.0', 1.9, 210, 7390.2]").unwrap();

        let details = DetailsMarker::read(&path).unwrap().unwrap();
        assert_eq!(details.tool_version, "0.4.0");
        assert_eq!(details.full_duration, None);
    }

    #[test]
    fn test_garbage_marker_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.fp.created.txt");
        std::fs::write(&path, "not a marker").unwrap();

        let err = CreatedMarker::read(&path).unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn test_absent_marker_is_none() {
        let temp_dir = TempDir::new().unwrap();
        assert!(CreatedMarker::read(&temp_dir.path().join("x")).unwrap().is_none());
    }
}
