//! The files of a single (metric, timestamp) window.

use super::layout::{human_date, timeseries_file_name, variables_file_name, ArtifactLayout, Scope};
use crate::config::PathsConfig;
use crate::error::{Result, StoreError};
use crate::metadata::MetricVariables;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A file in a window directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowFile {
    pub name: String,
    pub path: PathBuf,
}

/// Everything known about one window directory.
#[derive(Debug, Clone, Serialize)]
pub struct WindowArtifacts {
    pub dir: PathBuf,
    pub files: Vec<WindowFile>,
    /// Operator-facing images; internally rendered graphs are left out.
    pub images: Vec<PathBuf>,
    pub human_date: String,
    pub variables: Option<MetricVariables>,
    pub raw_timeseries: Option<Vec<String>>,
    pub data_to_process: bool,
}

impl WindowArtifacts {
    /// List and load a window. A missing directory is [`StoreError::InputMissing`].
    pub fn load(layout: &ArtifactLayout, base_name: &str, timestamp: i64, scope: Scope) -> Result<Self> {
        let dir = layout.window_dir(scope, base_name, timestamp);
        if !dir.is_dir() {
            return Err(StoreError::InputMissing { path: dir });
        }
        debug!("Loading window {} for {} at {}", dir.display(), base_name, timestamp);

        let files = list_files(&dir)?;
        let images = files
            .iter()
            .filter(|f| is_operator_image(&f.name))
            .map(|f| f.path.clone())
            .collect();

        let vars_path = dir.join(variables_file_name(base_name));
        let variables = match MetricVariables::from_file(&vars_path) {
            Ok(vars) => Some(vars),
            Err(e) => {
                warn!("Failed to load metric variables from {}: {}", vars_path.display(), e);
                None
            }
        };

        let ts_path = dir.join(timeseries_file_name(base_name));
        let raw_timeseries = match fs::read_to_string(&ts_path) {
            Ok(text) => Some(text.lines().map(str::to_string).collect()),
            Err(e) => {
                warn!("Failed to read timeseries {}: {}", ts_path.display(), e);
                None
            }
        };

        let data_to_process = variables.is_some() && raw_timeseries.is_some();

        Ok(Self {
            dir,
            files,
            images,
            human_date: human_date(timestamp),
            variables,
            raw_timeseries,
            data_to_process,
        })
    }
}

/// Regular files of `dir`, sorted by name. Dotfiles (locks, temp files) are skipped.
pub fn list_files(dir: &Path) -> Result<Vec<WindowFile>> {
    let entries = fs::read_dir(dir).map_err(|e| StoreError::io_with_path(e, dir))?;
    let mut files: Vec<WindowFile> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| WindowFile {
            name: e.file_name().to_string_lossy().into_owned(),
            path: e.path(),
        })
        .filter(|f| !f.name.starts_with('.'))
        .collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

fn is_operator_image(name: &str) -> bool {
    let is_image = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(PathsConfig::IMAGE_EXTENSION))
        .unwrap_or(false);
    is_image && !name.contains(PathsConfig::NOW_GRAPH_TAG) && !name.contains(PathsConfig::MATCHED_GRAPH_TAG)
}
