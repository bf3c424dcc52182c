//! HTTP transport for fault batches.

use crate::{OutboxError, OutboxResult};
use async_trait::async_trait;
use fault_record::FaultRecord;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Header name to value, keyed by the name as it will be sent.
pub type HeaderSet = BTreeMap<String, String>;

/// Network capability provided by the host.
///
/// Implementations issue one POST and report the response status. Errors
/// mean no response was obtained.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn post(&self, url: &str, headers: &HeaderSet, body: Vec<u8>) -> OutboxResult<u16>;
}

/// [`HttpClient`] backed by reqwest.
#[derive(Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(timeout: Duration) -> OutboxResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post(&self, url: &str, headers: &HeaderSet, body: Vec<u8>) -> OutboxResult<u16> {
        let mut request = self.client.post(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.body(body).send().await?;
        Ok(response.status().as_u16())
    }
}

/// Render a lower-cased header name in canonical case.
///
/// `content-type` and `authorization` have fixed spellings; anything else
/// gets each `-`-separated word capitalized.
pub fn canonical_header_name(lower: &str) -> String {
    match lower {
        "content-type" => "Content-Type".to_string(),
        "authorization" => "Authorization".to_string(),
        other => other
            .split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join("-"),
    }
}

fn normalize(headers: &HeaderSet) -> HeaderSet {
    headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect()
}

/// Combine configured headers with per-call overrides.
///
/// With `merge` the overrides win on conflicting names; without it the
/// overrides replace the configured set entirely.
pub fn build_headers(configured: &HeaderSet, overrides: Option<&HeaderSet>, merge: bool) -> HeaderSet {
    let mut combined = if merge {
        normalize(configured)
    } else {
        HeaderSet::new()
    };
    if let Some(overrides) = overrides {
        combined.extend(normalize(overrides));
    }

    combined
        .into_iter()
        .map(|(k, v)| (canonical_header_name(&k), v))
        .collect()
}

/// Transport configuration, fixed at init.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Collector endpoint.
    pub endpoint: String,
    /// Configured header set.
    pub headers: HeaderSet,
    /// Merge per-call overrides into `headers` instead of replacing them.
    pub merge_headers: bool,
    /// Emit diagnostic logs.
    pub debug: bool,
}

/// Sends fault batches to the collector.
#[derive(Clone)]
pub struct Transport {
    config: TransportConfig,
    client: Option<Arc<dyn HttpClient>>,
}

impl Transport {
    /// Create a transport. `client` is the network capability bound at init;
    /// `None` means the host has none and every send fails immediately.
    pub fn new(config: TransportConfig, client: Option<Arc<dyn HttpClient>>) -> Self {
        Self { config, client }
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// POST `records` as one ordered JSON array.
    ///
    /// Returns the status on a 2xx response.
    pub async fn send(
        &self,
        records: &[FaultRecord],
        overrides: Option<&HeaderSet>,
    ) -> OutboxResult<u16> {
        let Some(client) = &self.client else {
            if self.config.debug {
                warn!("No transport available to send faults");
            }
            return Err(OutboxError::NoTransport);
        };

        let headers = build_headers(&self.config.headers, overrides, self.config.merge_headers);
        let body = serde_json::to_vec(records)?;

        if self.config.debug {
            debug!(
                endpoint = %self.config.endpoint,
                records = records.len(),
                bytes = body.len(),
                "Sending fault batch"
            );
        }

        let status = client.post(&self.config.endpoint, &headers, body).await?;
        if !(200..300).contains(&status) {
            return Err(OutboxError::Status(status));
        }

        if self.config.debug {
            debug!(status, records = records.len(), "Fault batch delivered");
        }
        Ok(status)
    }
}
