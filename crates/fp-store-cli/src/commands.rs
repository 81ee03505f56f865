//! Subcommands and their dispatch onto the store.

use anyhow::{bail, Result};
use clap::{Subcommand, ValueEnum};
use fp_store_core::{FeatureProfileStore, Scope};
use serde_json::{json, Value};
use std::path::PathBuf;

/// Artifact tree selector.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScopeArg {
    Training,
    Profiles,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Training => Scope::TrainingData,
            ScopeArg::Profiles => Scope::FeaturesProfiles,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered metrics
    Metrics,

    /// Register a metric so profiles can be created for it
    RegisterMetric { metric: String },

    /// Inventory artifact directories by timestamp or metric
    Data {
        /// Metric name or "all"
        #[arg(long)]
        metric: Option<String>,

        /// Timestamp to match against directory paths
        #[arg(long)]
        timestamp: Option<String>,

        #[arg(long, value_enum, default_value = "training")]
        scope: ScopeArg,
    },

    /// Show the files, variables and timeseries of one window
    Window {
        metric: String,
        timestamp: i64,

        #[arg(long, value_enum, default_value = "training")]
        scope: ScopeArg,
    },

    /// Parse a metric variables file
    Vars { path: PathBuf },

    /// Create the feature profile for a window
    Create {
        metric: String,
        timestamp: i64,

        #[arg(long, value_enum, default_value = "training")]
        scope: ScopeArg,
    },

    /// Show a stored feature profile
    Details {
        fp_id: i64,

        /// Print the operator summary text instead of JSON fields
        #[arg(long)]
        text: bool,
    },

    /// Render graphs for a profile or a window
    #[command(subcommand)]
    Graphs(GraphsCommand),

    /// Look up the anomaly event id for a metric and range
    AnomalyId { metric: String, from: i64, until: i64 },
}

#[derive(Subcommand, Debug)]
pub enum GraphsCommand {
    /// Graphs of the most recent matches of a profile
    Matched { fp_id: i64 },

    /// Graphs ending now for a window's metric
    Now {
        metric: String,
        timestamp: i64,

        #[arg(long, value_enum, default_value = "training")]
        scope: ScopeArg,
    },
}

/// Run one command and return its JSON result.
pub async fn execute(store: &FeatureProfileStore, command: Command) -> Result<Value> {
    let output = match command {
        Command::Metrics => json!(store.list_metrics().await?),
        Command::RegisterMetric { metric } => {
            json!({ "metric_id": store.register_metric(&metric).await? })
        }
        Command::Data {
            metric,
            timestamp,
            scope,
        } => match (metric, timestamp) {
            (Some(metric), timestamp) => {
                json!(store.resolve_for_metric(&metric, timestamp.as_deref(), scope.into()).await?)
            }
            (None, Some(timestamp)) => json!(store.resolve_by_timestamp(&timestamp, scope.into()).await?),
            (None, None) => bail!("data needs --metric or --timestamp"),
        },
        Command::Window {
            metric,
            timestamp,
            scope,
        } => json!(store.load_window(&metric, timestamp, scope.into()).await?),
        Command::Vars { path } => json!(store.parse_variables(&path).await?.entries()),
        Command::Create {
            metric,
            timestamp,
            scope,
        } => json!(store.create_features_profile(&metric, timestamp, scope.into()).await?),
        Command::Details { fp_id, text } => {
            let details = store.get_details(fp_id).await?;
            if text {
                Value::String(details.summary())
            } else {
                json!(details)
            }
        }
        Command::Graphs(GraphsCommand::Matched { fp_id }) => json!(store.fetch_matched_graphs(fp_id).await?),
        Command::Graphs(GraphsCommand::Now {
            metric,
            timestamp,
            scope,
        }) => json!(store.fetch_now_graphs(&metric, timestamp, scope.into()).await?),
        Command::AnomalyId { metric, from, until } => {
            json!({ "anomaly_id": store.find_anomaly_event_id(&metric, from, until).await })
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_store_core::Settings;
    use tempfile::TempDir;

    async fn create_store(temp_dir: &TempDir) -> FeatureProfileStore {
        FeatureProfileStore::builder(Settings::rooted_at(temp_dir.path()))
            .auto_create_dirs(true)
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_then_list() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir).await;

        let registered = execute(&store, Command::RegisterMetric { metric: "metrics.stats.bar".into() })
            .await
            .unwrap();
        assert_eq!(registered["metric_id"], 1);

        let metrics = execute(&store, Command::Metrics).await.unwrap();
        assert_eq!(metrics[0]["metric"], "stats.bar");
        assert_eq!(metrics[0]["ionosphere_enabled"], false);
    }

    #[tokio::test]
    async fn test_data_requires_selector() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir).await;

        let result = execute(
            &store,
            Command::Data {
                metric: None,
                timestamp: None,
                scope: ScopeArg::Training,
            },
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_details_not_found_keeps_store_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir).await;

        let err = execute(&store, Command::Details { fp_id: 42, text: false })
            .await
            .unwrap_err();
        let store_err = err.downcast_ref::<fp_store_core::StoreError>().unwrap();
        assert_eq!(store_err.exit_code(), 8);
    }
}
