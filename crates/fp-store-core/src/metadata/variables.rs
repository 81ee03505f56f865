//! Parser for per-window metric variables files.
//!
//! The anomaly pipeline drops a `<metric>.txt` file of `key = value` lines
//! next to every training window. Only a fixed set of keys is understood;
//! each one has a fixed type.

use crate::error::{Result, StoreError};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

/// A typed metric variable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VariableValue {
    Str(String),
    Float(f64),
    Int(i64),
    List(Vec<String>),
    Bool(bool),
}

impl VariableValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VariableValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            VariableValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            VariableValue::Float(f) => Some(*f),
            VariableValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            VariableValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            VariableValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VariableType {
    Str,
    Float,
    Int,
    List,
    Bool,
}

const KNOWN_KEYS: &[(&str, VariableType)] = &[
    ("metric", VariableType::Str),
    ("anomaly_dir", VariableType::Str),
    ("added_by", VariableType::Str),
    ("app", VariableType::Str),
    ("source", VariableType::Str),
    ("value", VariableType::Float),
    ("from_timestamp", VariableType::Int),
    ("metric_timestamp", VariableType::Int),
    ("added_at", VariableType::Int),
    ("full_duration", VariableType::Int),
    ("algorithms", VariableType::List),
    ("triggered_algorithms", VariableType::List),
    ("graphite_metric", VariableType::Bool),
    ("run_crucible_tests", VariableType::Bool),
];

fn key_type(key: &str) -> Option<VariableType> {
    KNOWN_KEYS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, ty)| *ty)
}

/// Ordered, typed metric variables. Duplicate keys are kept; lookups are last-wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricVariables {
    entries: Vec<(String, VariableValue)>,
}

impl MetricVariables {
    /// Read and parse a variables file.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(StoreError::InputMissing {
                path: path.to_path_buf(),
            });
        }
        let contents =
            std::fs::read_to_string(path).map_err(|e| StoreError::io_with_path(e, path))?;
        debug!("Loading metric variables from {}", path.display());
        Self::parse(&contents).map_err(|message| StoreError::parse(path, message))
    }

    /// Parse variables text. The error is a bare message; callers add the path.
    pub fn parse(contents: &str) -> std::result::Result<Self, String> {
        let mut entries = Vec::new();

        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, raw)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let raw = raw.trim();
            let Some(ty) = key_type(key) else {
                continue;
            };
            match coerce(ty, raw) {
                Some(value) => entries.push((key.to_string(), value)),
                None => warn!(
                    "Dropping metric variable {} on line {}: cannot coerce {:?}",
                    key,
                    line_no + 1,
                    raw
                ),
            }
        }

        if entries.is_empty() {
            return Err("no recognized metric variables found".to_string());
        }
        Ok(Self { entries })
    }

    /// All entries in file order.
    pub fn entries(&self) -> &[(String, VariableValue)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The value of the last occurrence of `key`.
    pub fn get(&self, key: &str) -> Option<&VariableValue> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn metric(&self) -> Option<&str> {
        self.get("metric").and_then(VariableValue::as_str)
    }

    pub fn full_duration(&self) -> Option<i64> {
        self.get("full_duration").and_then(VariableValue::as_int)
    }

    pub fn metric_timestamp(&self) -> Option<i64> {
        self.get("metric_timestamp").and_then(VariableValue::as_int)
    }
}

fn strip_quotes(raw: &str) -> String {
    raw.replace(['\'', '"'], "").trim().to_string()
}

fn coerce(ty: VariableType, raw: &str) -> Option<VariableValue> {
    match ty {
        VariableType::Str => Some(VariableValue::Str(strip_quotes(raw))),
        VariableType::Float => strip_quotes(raw).parse::<f64>().ok().map(VariableValue::Float),
        VariableType::Int => {
            let cleaned = strip_quotes(raw);
            cleaned
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    cleaned
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
                .map(VariableValue::Int)
        }
        VariableType::List => {
            let inner = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
            let items = inner
                .split(',')
                .map(strip_quotes)
                .filter(|item| !item.is_empty())
                .collect();
            Some(VariableValue::List(items))
        }
        VariableType::Bool => {
            let cleaned = strip_quotes(raw);
            Some(VariableValue::Bool(cleaned == "True" || cleaned == "true"))
        }
    }
}
