//! Graph rendering and anomaly lookup collaborators.

mod fetcher;
mod http;
mod renderer;

pub use fetcher::MatchedGraphFetcher;
pub use http::{parse_anomaly_id, HttpAnomalyLookup, HttpGraphRenderer};
pub use renderer::{AnomalyLookup, GraphRenderer};
