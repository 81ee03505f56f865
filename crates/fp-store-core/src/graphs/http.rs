//! `reqwest` implementations of the graph and anomaly boundary traits.

use super::renderer::{AnomalyLookup, GraphRenderer};
use crate::config::{NetworkConfig, ServiceAuth};
use crate::error::{Result, StoreError};
use crate::metadata::{parse_literal_list, Literal};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Shared client setup for both services.
#[derive(Debug, Clone)]
struct ServiceClient {
    client: Client,
    base: Url,
    auth: Option<ServiceAuth>,
    timeout: Duration,
}

impl ServiceClient {
    fn new(base_url: &str, path: &str, auth: Option<ServiceAuth>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(&format!("{}/{}", base_url.trim_end_matches('/'), path)).map_err(|e| {
            StoreError::Config {
                message: format!("Invalid service URL {}: {}", base_url, e),
            }
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| StoreError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self {
            client,
            base,
            auth,
            timeout,
        })
    }

    fn url(&self, query: &[(&str, String)]) -> Url {
        let mut url = self.base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.auth {
            Some(auth) => request.basic_auth(&auth.user, Some(&auth.password)),
            None => request,
        }
    }

    async fn send(&self, url: Url) -> Result<Response> {
        debug!("GET {}", url);
        let response = self.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout(self.timeout)
            } else {
                StoreError::Network {
                    message: format!("GET {} failed: {}", url, e),
                    source: Some(e),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Network {
                message: format!("GET {} returned {}", url, status),
                source: None,
            });
        }
        Ok(response)
    }
}

/// Graph renderer backed by a Graphite-style `/render/` endpoint.
#[derive(Debug, Clone)]
pub struct HttpGraphRenderer {
    service: ServiceClient,
}

impl HttpGraphRenderer {
    pub fn new(base_url: &str, auth: Option<ServiceAuth>) -> Result<Self> {
        Self::with_timeout(base_url, auth, NetworkConfig::RENDER_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, auth: Option<ServiceAuth>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            service: ServiceClient::new(base_url, "render/", auth, timeout)?,
        })
    }

    pub fn render_url(&self, metric: &str, from: i64, until: i64) -> Url {
        self.service.url(&[
            ("target", metric.to_string()),
            ("from", from.to_string()),
            ("until", until.to_string()),
            ("format", "png".to_string()),
        ])
    }
}

#[async_trait]
impl GraphRenderer for HttpGraphRenderer {
    async fn render_graph(&self, metric: &str, from: i64, until: i64) -> Result<Vec<u8>> {
        let response = self.service.send(self.render_url(metric, from, until)).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(StoreError::Network {
                message: format!("Empty graph for {} {}..{}", metric, from, until),
                source: None,
            });
        }
        Ok(bytes.to_vec())
    }
}

/// Anomaly lookup backed by the `/panorama` endpoint.
#[derive(Debug, Clone)]
pub struct HttpAnomalyLookup {
    service: ServiceClient,
}

impl HttpAnomalyLookup {
    pub fn new(base_url: &str, auth: Option<ServiceAuth>) -> Result<Self> {
        Ok(Self {
            service: ServiceClient::new(base_url, "panorama", auth, NetworkConfig::LOOKUP_TIMEOUT)?,
        })
    }

    pub fn lookup_url(&self, metric: &str, from: i64, until: i64) -> Url {
        self.service.url(&[
            ("metric", metric.to_string()),
            ("from_timestamp", from.to_string()),
            ("until_timestamp", until.to_string()),
            ("panorama_anomaly_id", "true".to_string()),
        ])
    }
}

#[async_trait]
impl AnomalyLookup for HttpAnomalyLookup {
    async fn find_anomaly_event_id(&self, metric: &str, from: i64, until: i64) -> Result<Option<i64>> {
        let url = self.lookup_url(metric, from, until);
        let body = self.service.send(url.clone()).await?.text().await?;
        parse_anomaly_id(&body).map_err(|message| StoreError::Network {
            message: format!("Unexpected response from {}: {}", url, message),
            source: None,
        })
    }
}

/// `[]` is no event; otherwise the first element of the first row is the id.
pub fn parse_anomaly_id(body: &str) -> std::result::Result<Option<i64>, String> {
    let rows = parse_literal_list(body)?;
    let Some(first) = rows.first() else {
        return Ok(None);
    };
    first
        .as_list()
        .and_then(|row| row.first())
        .and_then(Literal::as_i64)
        .map(Some)
        .ok_or_else(|| "first row has no numeric id".to_string())
}
