//! Relational catalog of metrics, feature profiles and matched events.
//!
//! The [`CatalogBackend`] trait is the seam; [`SqliteCatalog`] is the
//! implementation used by the store.

mod sqlite;
mod traits;

pub use sqlite::SqliteCatalog;
pub use traits::{
    feature_table_name, timeseries_table_name, CatalogBackend, FeatureRow, MetricRecord,
    NewProfile, ProfileRecord, TimeseriesPoint,
};
