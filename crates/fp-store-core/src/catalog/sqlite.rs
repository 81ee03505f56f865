//! SQLite catalog implementation.

use super::traits::{
    feature_table_name, timeseries_table_name, CatalogBackend, FeatureRow, MetricRecord,
    NewProfile, ProfileRecord, TimeseriesPoint,
};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// SQLite-backed catalog.
///
/// Uses WAL mode for concurrent readers across processes and
/// `Arc<Mutex<Connection>>` for thread safety within a process. Each operation
/// holds the connection only for its own duration.
pub struct SqliteCatalog {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    /// Open (or create) the catalog at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                    message: format!("Failed to create catalog directory: {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| StoreError::StorageUnavailable {
            message: format!("Failed to open catalog {}: {}", db_path.display(), e),
            source: Some(e),
        })?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        debug!("Opened catalog at {}", db_path.display());
        Ok(Self {
            db_path: Some(db_path.to_path_buf()),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private in-memory catalog, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            db_path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;\n\
             PRAGMA foreign_keys=ON;",
            StoreConfig::BUSY_TIMEOUT_MS
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                metric TEXT NOT NULL UNIQUE,
                ionosphere_enabled INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS feature_profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                metric_id INTEGER NOT NULL REFERENCES metrics(id),
                requested_timestamp INTEGER NOT NULL,
                full_duration INTEGER NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                tool_version TEXT NOT NULL,
                calc_time TEXT NOT NULL DEFAULT '',
                features_count INTEGER NOT NULL DEFAULT 0,
                features_sum TEXT NOT NULL DEFAULT '0',
                deleted INTEGER NOT NULL DEFAULT 0,
                matched_count INTEGER NOT NULL DEFAULT 0,
                last_matched INTEGER NOT NULL DEFAULT 0,
                created_timestamp INTEGER NOT NULL,
                checked_count INTEGER NOT NULL DEFAULT 0,
                last_checked INTEGER NOT NULL DEFAULT 0,
                UNIQUE (metric_id, requested_timestamp)
            );

            CREATE INDEX IF NOT EXISTS idx_feature_profiles_metric
                ON feature_profiles(metric_id);

            CREATE TABLE IF NOT EXISTS matched_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fp_id INTEGER NOT NULL REFERENCES feature_profiles(id),
                metric_timestamp INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_matched_events_fp
                ON matched_events(fp_id);
            "#,
        )?;
        Ok(())
    }

    pub(crate) fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::StorageUnavailable {
            message: "Failed to acquire catalog connection lock".to_string(),
            source: None,
        })
    }

    fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<ProfileRecord> {
        Ok(ProfileRecord {
            id: row.get(0)?,
            metric_id: row.get(1)?,
            metric: row.get(2)?,
            requested_timestamp: row.get(3)?,
            full_duration: row.get(4)?,
            enabled: row.get::<_, i64>(5)? != 0,
            tool_version: row.get(6)?,
            calc_time: row.get(7)?,
            features_count: row.get(8)?,
            features_sum: row.get(9)?,
            deleted: row.get::<_, i64>(10)? != 0,
            matched_count: row.get(11)?,
            last_matched: row.get(12)?,
            created_timestamp: row.get(13)?,
            checked_count: row.get(14)?,
            last_checked: row.get(15)?,
        })
    }

    fn row_to_metric(row: &Row<'_>) -> rusqlite::Result<MetricRecord> {
        Ok(MetricRecord {
            id: row.get(0)?,
            metric: row.get(1)?,
            ionosphere_enabled: row.get::<_, i64>(2)? != 0,
        })
    }

    fn table_exists_on(conn: &Connection, name: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

/// UNIQUE constraint only; foreign-key and NOT NULL failures are storage errors.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl CatalogBackend for SqliteCatalog {
    fn metric_id(&self, metric: &str) -> Result<Option<i64>> {
        let conn = self.lock_conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM metrics WHERE metric = ?1",
                params![metric],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn register_metric(&self, metric: &str) -> Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO metrics (metric, ionosphere_enabled) VALUES (?1, 0)",
            params![metric],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM metrics WHERE metric = ?1",
            params![metric],
            |row| row.get(0),
        )?;
        debug!("Registered metric {} as id {}", metric, id);
        Ok(id)
    }

    fn list_metrics(&self) -> Result<Vec<MetricRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT id, metric, ionosphere_enabled FROM metrics ORDER BY metric")?;
        let rows = stmt
            .query_map([], Self::row_to_metric)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn metric(&self, metric_id: i64) -> Result<Option<MetricRecord>> {
        let conn = self.lock_conn()?;
        let record = conn
            .query_row(
                "SELECT id, metric, ionosphere_enabled FROM metrics WHERE id = ?1",
                params![metric_id],
                Self::row_to_metric,
            )
            .optional()?;
        Ok(record)
    }

    fn enable_metric(&self, metric_id: i64) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute(
            "UPDATE metrics SET ionosphere_enabled = 1 WHERE id = ?1",
            params![metric_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                what: format!("metric id {}", metric_id),
            });
        }
        Ok(())
    }

    fn insert_profile(&self, profile: &NewProfile) -> Result<i64> {
        let conn = self.lock_conn()?;
        let inserted = conn.execute(
            "INSERT INTO feature_profiles (
                metric_id, requested_timestamp, full_duration, enabled, tool_version,
                calc_time, features_count, features_sum, created_timestamp
             ) VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, ?8)",
            params![
                profile.metric_id,
                profile.requested_timestamp,
                profile.full_duration,
                profile.tool_version,
                profile.calc_time,
                profile.features_count as i64,
                profile.features_sum,
                profile.created_timestamp,
            ],
        );

        match inserted {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => {
                let (existing_fp_id, metric): (i64, String) = conn.query_row(
                    "SELECT fp.id, m.metric FROM feature_profiles fp
                     JOIN metrics m ON m.id = fp.metric_id
                     WHERE fp.metric_id = ?1 AND fp.requested_timestamp = ?2",
                    params![profile.metric_id, profile.requested_timestamp],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Err(StoreError::DuplicateProfile {
                    metric,
                    timestamp: profile.requested_timestamp,
                    existing_fp_id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn profile(&self, fp_id: i64) -> Result<Option<ProfileRecord>> {
        let conn = self.lock_conn()?;
        let record = conn
            .query_row(
                "SELECT fp.id, fp.metric_id, m.metric, fp.requested_timestamp, fp.full_duration,
                        fp.enabled, fp.tool_version, fp.calc_time, fp.features_count,
                        fp.features_sum, fp.deleted, fp.matched_count, fp.last_matched,
                        fp.created_timestamp, fp.checked_count, fp.last_checked
                 FROM feature_profiles fp
                 JOIN metrics m ON m.id = fp.metric_id
                 WHERE fp.id = ?1",
                params![fp_id],
                Self::row_to_profile,
            )
            .optional()?;
        Ok(record)
    }

    fn ensure_feature_table(&self, metric_id: i64) -> Result<String> {
        let name = feature_table_name(metric_id);
        let conn = self.lock_conn()?;
        if Self::table_exists_on(&conn, &name)? {
            debug!("Reusing table {}", name);
            return Ok(name);
        }
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {name} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fp_id INTEGER NOT NULL,
                feature_id INTEGER NOT NULL,
                value REAL
            );
            CREATE INDEX IF NOT EXISTS idx_{name}_fp ON {name}(fp_id);"
        ))?;
        info!("Created table {}", name);
        Ok(name)
    }

    fn insert_feature_values(&self, metric_id: i64, fp_id: i64, rows: &[FeatureRow]) -> Result<usize> {
        let name = feature_table_name(metric_id);
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (fp_id, feature_id, value) VALUES (?1, ?2, ?3)",
                name
            ))?;
            for row in rows {
                written += stmt.execute(params![fp_id, row.feature_id, row.value])?;
            }
        }
        if written != rows.len() {
            return Err(StoreError::PartialWrite {
                table: name,
                expected: rows.len(),
                written,
            });
        }
        tx.commit()?;
        Ok(written)
    }

    fn feature_values(&self, metric_id: i64, fp_id: i64) -> Result<Vec<FeatureRow>> {
        let conn = self.lock_conn()?;
        let name = feature_table_name(metric_id);
        if !Self::table_exists_on(&conn, &name)? {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT feature_id, value FROM {} WHERE fp_id = ?1 ORDER BY id",
            name
        ))?;
        let rows = stmt
            .query_map(params![fp_id], |row| {
                Ok(FeatureRow {
                    feature_id: row.get(0)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn ensure_timeseries_table(&self, metric_id: i64) -> Result<String> {
        let name = timeseries_table_name(metric_id);
        let conn = self.lock_conn()?;
        if Self::table_exists_on(&conn, &name)? {
            debug!("Reusing table {}", name);
            return Ok(name);
        }
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {name} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fp_id INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                value REAL
            );
            CREATE INDEX IF NOT EXISTS idx_{name}_fp ON {name}(fp_id);"
        ))?;
        info!("Created table {}", name);
        Ok(name)
    }

    fn insert_timeseries(&self, metric_id: i64, fp_id: i64, points: &[TimeseriesPoint]) -> Result<usize> {
        let name = timeseries_table_name(metric_id);
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (fp_id, timestamp, value) VALUES (?1, ?2, ?3)",
                name
            ))?;
            for point in points {
                written += stmt.execute(params![fp_id, point.timestamp, point.value])?;
            }
        }
        if written != points.len() {
            return Err(StoreError::PartialWrite {
                table: name,
                expected: points.len(),
                written,
            });
        }
        tx.commit()?;
        Ok(written)
    }

    fn timeseries(&self, metric_id: i64, fp_id: i64) -> Result<Vec<TimeseriesPoint>> {
        let conn = self.lock_conn()?;
        let name = timeseries_table_name(metric_id);
        if !Self::table_exists_on(&conn, &name)? {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT timestamp, value FROM {} WHERE fp_id = ?1 ORDER BY id",
            name
        ))?;
        let points = stmt
            .query_map(params![fp_id], |row| {
                Ok(TimeseriesPoint {
                    timestamp: row.get(0)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(points)
    }

    fn record_match(&self, fp_id: i64, metric_timestamp: i64) -> Result<i64> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE feature_profiles
             SET matched_count = matched_count + 1, last_matched = ?2
             WHERE id = ?1",
            params![fp_id, metric_timestamp],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                what: format!("feature profile {}", fp_id),
            });
        }
        tx.execute(
            "INSERT INTO matched_events (fp_id, metric_timestamp) VALUES (?1, ?2)",
            params![fp_id, metric_timestamp],
        )?;
        let event_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(event_id)
    }

    fn record_check(&self, fp_id: i64, checked_at: i64) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute(
            "UPDATE feature_profiles
             SET checked_count = checked_count + 1, last_checked = ?2
             WHERE id = ?1",
            params![fp_id, checked_at],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                what: format!("feature profile {}", fp_id),
            });
        }
        Ok(())
    }

    fn matched_timestamps(&self, fp_id: i64) -> Result<Vec<i64>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT metric_timestamp FROM matched_events WHERE fp_id = ?1 ORDER BY id")?;
        let timestamps = stmt
            .query_map(params![fp_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(timestamps)
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        Self::table_exists_on(&conn, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_profile(metric_id: i64, requested_timestamp: i64) -> NewProfile {
        NewProfile {
            metric_id,
            requested_timestamp,
            full_duration: 86_400,
            tool_version: "0.4.0".into(),
            calc_time: String::new(),
            features_count: 2,
            features_sum: "1.73".into(),
            created_timestamp: 1_610_000_500,
        }
    }

    #[test]
    fn test_open_creates_schema() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = SqliteCatalog::open(temp_dir.path().join("nested/profiles.sqlite")).unwrap();
        assert!(catalog.table_exists("metrics").unwrap());
        assert!(catalog.table_exists("feature_profiles").unwrap());
        assert!(catalog.table_exists("matched_events").unwrap());
    }

    #[test]
    fn test_register_metric_is_idempotent() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let a = catalog.register_metric("stats.bar").unwrap();
        let b = catalog.register_metric("stats.bar").unwrap();
        assert_eq!(a, b);
        assert_eq!(catalog.metric_id("stats.bar").unwrap(), Some(a));
        assert_eq!(catalog.metric_id("stats.nope").unwrap(), None);
    }

    #[test]
    fn test_duplicate_profile_reports_existing_id() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let metric_id = catalog.register_metric("stats.bar").unwrap();
        let fp_id = catalog.insert_profile(&new_profile(metric_id, 1_610_000_000)).unwrap();

        let err = catalog
            .insert_profile(&new_profile(metric_id, 1_610_000_000))
            .unwrap_err();
        match err {
            StoreError::DuplicateProfile {
                metric,
                existing_fp_id,
                ..
            } => {
                assert_eq!(metric, "stats.bar");
                assert_eq!(existing_fp_id, fp_id);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_profile_for_unknown_metric_is_storage_error() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let result = catalog.insert_profile(&new_profile(999, 1_610_000_000));
        assert!(matches!(result, Err(StoreError::StorageUnavailable { .. })));
    }

    #[test]
    fn test_per_metric_tables_created_once() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let metric_id = catalog.register_metric("stats.bar").unwrap();
        let first = catalog.ensure_feature_table(metric_id).unwrap();
        let second = catalog.ensure_feature_table(metric_id).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, format!("feature_values_{}", metric_id));

        let rows = [
            FeatureRow { feature_id: 3, value: 1.23 },
            FeatureRow { feature_id: 7, value: 0.5 },
        ];
        assert_eq!(catalog.insert_feature_values(metric_id, 1, &rows).unwrap(), 2);
        assert_eq!(catalog.feature_values(metric_id, 1).unwrap(), rows.to_vec());
    }

    #[test]
    fn test_counters_increment() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let metric_id = catalog.register_metric("stats.bar").unwrap();
        let fp_id = catalog.insert_profile(&new_profile(metric_id, 1_610_000_000)).unwrap();

        catalog.record_match(fp_id, 1_610_100_000).unwrap();
        catalog.record_match(fp_id, 1_610_200_000).unwrap();
        catalog.record_check(fp_id, 1_610_300_000).unwrap();

        let record = catalog.profile(fp_id).unwrap().unwrap();
        assert_eq!(record.matched_count, 2);
        assert_eq!(record.last_matched, 1_610_200_000);
        assert_eq!(record.checked_count, 1);
        assert_eq!(
            catalog.matched_timestamps(fp_id).unwrap(),
            vec![1_610_100_000, 1_610_200_000]
        );
        assert!(matches!(
            catalog.record_check(999, 1),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_enable_metric_is_monotonic() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let metric_id = catalog.register_metric("stats.bar").unwrap();
        catalog.enable_metric(metric_id).unwrap();
        catalog.enable_metric(metric_id).unwrap();
        assert!(catalog.metric(metric_id).unwrap().unwrap().ionosphere_enabled);
    }
}
