//! Feature-name dictionary and the transposed features CSV.

use crate::catalog::FeatureRow;
use crate::error::{Result, StoreError};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Prefix the extractor puts on every feature computed over the `value` column.
const VALUE_PREFIX: &str = "value__";

/// Feature names known to the catalog, keyed by stable numeric id.
const BUILTIN_FEATURES: &[(i64, &str)] = &[
    (1, "value__abs_energy"),
    (2, "value__absolute_sum_of_changes"),
    (3, "value__mean"),
    (4, "value__median"),
    (5, "value__minimum"),
    (6, "value__maximum"),
    (7, "value__variance"),
    (8, "value__standard_deviation"),
    (9, "value__sum_values"),
    (10, "value__length"),
    (11, "value__skewness"),
    (12, "value__kurtosis"),
    (13, "value__mean_change"),
    (14, "value__mean_abs_change"),
    (15, "value__mean_second_derivate_central"),
    (16, "value__count_above_mean"),
    (17, "value__count_below_mean"),
    (18, "value__first_location_of_maximum"),
    (19, "value__first_location_of_minimum"),
    (20, "value__last_location_of_maximum"),
    (21, "value__last_location_of_minimum"),
    (22, "value__longest_strike_above_mean"),
    (23, "value__longest_strike_below_mean"),
    (24, "value__has_duplicate"),
    (25, "value__has_duplicate_max"),
    (26, "value__has_duplicate_min"),
    (27, "value__variance_larger_than_standard_deviation"),
    (28, "value__percentage_of_reoccurring_datapoints_to_all_datapoints"),
    (29, "value__sum_of_reoccurring_values"),
    (30, "value__ratio_value_number_to_time_series_length"),
    (31, "value__large_standard_deviation__r_0.5"),
    (32, "value__symmetry_looking__r_0.05"),
];

/// Maps feature names to catalog ids.
///
/// Names are matched with or without the `value__` prefix, and `var` is
/// accepted for `variance`.
#[derive(Debug, Clone)]
pub struct FeatureDictionary {
    ids: HashMap<String, i64>,
}

impl Default for FeatureDictionary {
    fn default() -> Self {
        Self::from_pairs(BUILTIN_FEATURES.iter().map(|(id, name)| (*id, name.to_string())))
    }
}

impl FeatureDictionary {
    /// Build a dictionary from (id, name) pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i64, String)>) -> Self {
        let ids = pairs
            .into_iter()
            .map(|(id, name)| (canonical(&name).to_string(), id))
            .collect();
        Self { ids }
    }

    pub fn id_of(&self, name: &str) -> Option<i64> {
        let key = canonical(name.trim());
        self.ids.get(key).copied().or_else(|| match key {
            "var" => self.ids.get("variance").copied(),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn canonical(name: &str) -> &str {
    name.strip_prefix(VALUE_PREFIX).unwrap_or(name)
}

/// Mapped rows of a features file plus the totals stored with the profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeatures {
    pub rows: Vec<FeatureRow>,
    pub sum: f64,
}

impl ParsedFeatures {
    pub fn count(&self) -> usize {
        self.rows.len()
    }
}

/// Parse `feature_name,value` rows, keeping only mapped names with numeric values.
///
/// An empty result is a [`StoreError::Parse`].
pub fn parse_features_file(path: &Path, dictionary: &FeatureDictionary) -> Result<ParsedFeatures> {
    if !path.is_file() {
        return Err(StoreError::InputMissing {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| StoreError::io_with_path(e, path))?;
    let parsed = parse_features(&contents, dictionary);
    if parsed.rows.is_empty() {
        return Err(StoreError::parse(path, "no mapped feature rows"));
    }
    debug!("Parsed {} feature rows from {}", parsed.count(), path.display());
    Ok(parsed)
}

pub fn parse_features(contents: &str, dictionary: &FeatureDictionary) -> ParsedFeatures {
    let mut rows = Vec::new();
    let mut dropped = 0usize;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = split_csv_line(line).into_iter();
        let (Some(name), Some(raw_value)) = (fields.next(), fields.next()) else {
            dropped += 1;
            continue;
        };
        let Some(feature_id) = dictionary.id_of(&name) else {
            dropped += 1;
            continue;
        };
        match raw_value.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => rows.push(FeatureRow { feature_id, value }),
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!("Dropped {} unmapped or non-numeric feature rows", dropped);
    }
    let sum = rows.iter().map(|r| r.value).sum();
    ParsedFeatures { rows, sum }
}

/// Split one CSV record on commas, honouring double-quoted fields.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
