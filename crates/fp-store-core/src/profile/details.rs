//! Read-only view of a stored feature profile.

use crate::artifacts::human_date;
use crate::catalog::{CatalogBackend, ProfileRecord};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use serde::Serialize;

/// Summary fields of a feature profile, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileDetails {
    pub fp_id: i64,
    pub metric: String,
    pub requested_timestamp: i64,
    pub enabled: bool,
    pub tool_version: String,
    pub calc_time: String,
    pub features_count: i64,
    pub features_sum: String,
    pub deleted: bool,
    pub matched_count: i64,
    pub last_matched: i64,
    pub last_matched_human: String,
    pub created_timestamp: i64,
    pub full_duration: i64,
    pub checked_count: i64,
    pub last_checked: i64,
    pub last_checked_human: String,
}

impl From<ProfileRecord> for ProfileDetails {
    fn from(record: ProfileRecord) -> Self {
        Self {
            last_matched_human: date_or(record.last_matched, StoreConfig::NEVER_MATCHED),
            last_checked_human: date_or(record.last_checked, StoreConfig::NEVER_CHECKED),
            fp_id: record.id,
            metric: record.metric,
            requested_timestamp: record.requested_timestamp,
            enabled: record.enabled,
            tool_version: record.tool_version,
            calc_time: record.calc_time,
            features_count: record.features_count,
            features_sum: record.features_sum,
            deleted: record.deleted,
            matched_count: record.matched_count,
            last_matched: record.last_matched,
            created_timestamp: record.created_timestamp,
            full_duration: record.full_duration,
            checked_count: record.checked_count,
            last_checked: record.last_checked,
        }
    }
}

fn date_or(epoch: i64, never: &str) -> String {
    if epoch == 0 {
        never.to_string()
    } else {
        human_date(epoch)
    }
}

impl ProfileDetails {
    /// Multi-line operator summary.
    pub fn summary(&self) -> String {
        format!(
            "tool_version      :: {} | calc_time :: {}\n\
             features_count    :: {}\n\
             features_sum      :: {}\n\
             deleted           :: {}\n\
             matched_count     :: {}\n\
             last_matched      :: {} | human_date :: {}\n\
             created_timestamp :: {}\n\
             full_duration     :: {}\n\
             checked_count     :: {}\n\
             last_checked      :: {} | human_date :: {}\n",
            self.tool_version,
            self.calc_time,
            self.features_count,
            self.features_sum,
            self.deleted,
            self.matched_count,
            self.last_matched,
            self.last_matched_human,
            self.created_timestamp,
            self.full_duration,
            self.checked_count,
            self.last_checked,
            self.last_checked_human,
        )
    }
}

/// Look up one profile by id.
pub fn get_details(catalog: &dyn CatalogBackend, fp_id: i64) -> Result<ProfileDetails> {
    catalog
        .profile(fp_id)?
        .map(ProfileDetails::from)
        .ok_or_else(|| StoreError::NotFound {
            what: format!("feature profile {}", fp_id),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{NewProfile, SqliteCatalog};

    fn seeded() -> (SqliteCatalog, i64) {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let metric_id = catalog.register_metric("stats.bar").unwrap();
        let fp_id = catalog
            .insert_profile(&NewProfile {
                metric_id,
                requested_timestamp: 1_610_000_000,
                full_duration: 86_400,
                tool_version: "0.4.0".into(),
                calc_time: "1.9".into(),
                features_count: 2,
                features_sum: "1.73".into(),
                created_timestamp: 1_610_000_500,
            })
            .unwrap();
        (catalog, fp_id)
    }

    #[test]
    fn test_never_sentinels() {
        let (catalog, fp_id) = seeded();
        let details = get_details(&catalog, fp_id).unwrap();
        assert_eq!(details.metric, "stats.bar");
        assert_eq!(details.last_matched_human, "never matched");
        assert_eq!(details.last_checked_human, "never checked");
        assert!(details.summary().contains("features_count    :: 2"));
    }

    #[test]
    fn test_matched_dates_are_rendered() {
        let (catalog, fp_id) = seeded();
        catalog.record_match(fp_id, 1_610_100_000).unwrap();
        let details = get_details(&catalog, fp_id).unwrap();
        assert_eq!(details.matched_count, 1);
        assert_ne!(details.last_matched_human, "never matched");
        assert!(details.last_matched_human.contains('('));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (catalog, _) = seeded();
        assert!(matches!(get_details(&catalog, 42), Err(StoreError::NotFound { .. })));
    }
}
