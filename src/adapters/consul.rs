// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consul KV adapter.
//!
//! A thin client for the Consul KV HTTP API supporting the blocking queries the
//! push watcher relies on, plus the point lookups used for seeding. Store
//! payloads are validated here, at the boundary, into [`WatchPayload`].

use crate::domain::{ConfigError, Result};
use crate::ports::Getter;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Wait time Consul applies to a blocking query when none is requested.
const SERVER_DEFAULT_WAIT: Duration = Duration::from_secs(300);

/// Slack on top of the wait time before the HTTP request itself times out.
const REQUEST_SLACK: Duration = Duration::from_secs(10);

/// Timeout for a non-blocking query.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

const INDEX_HEADER: &str = "X-Consul-Index";
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Failure of a single Consul request.
#[derive(Debug, Error)]
pub enum ConsulError {
    /// The request could not be completed.
    #[error("Consul request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Consul answered with an unexpected status.
    #[error("Consul returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },
    /// The response did not have the expected shape.
    #[error("invalid Consul response: {0}")]
    Invalid(String),
}

impl ConsulError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ConsulError::Transport(e) => !e.is_decode() && !e.is_builder(),
            ConsulError::Status { status, .. } => *status >= 500 || *status == 429,
            ConsulError::Invalid(_) => false,
        }
    }
}

impl From<ConsulError> for ConfigError {
    fn from(e: ConsulError) -> Self {
        ConfigError::SourceError {
            source_name: "consul".to_string(),
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

/// One decoded KV entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    /// Full key
    pub key: String,
    /// Decoded value, empty when Consul stores none. Bytes that are not
    /// valid UTF-8 are replaced with U+FFFD.
    pub value: String,
    /// Index of the last modification of this key
    pub modify_index: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawEntry {
    key: String,
    value: Option<String>,
    modify_index: u64,
}

impl TryFrom<RawEntry> for KvEntry {
    type Error = ConsulError;

    fn try_from(raw: RawEntry) -> std::result::Result<Self, Self::Error> {
        let value = match raw.value {
            None => String::new(),
            Some(encoded) => {
                let bytes = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                    ConsulError::Invalid(format!("value of {} is not base64: {}", raw.key, e))
                })?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };
        Ok(KvEntry {
            key: raw.key,
            value,
            modify_index: raw.modify_index,
        })
    }
}

/// What a blocking query delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchPayload {
    /// A single key's entry
    Entry(KvEntry),
    /// The full entry set under a prefix
    Entries(Vec<KvEntry>),
}

/// The shape of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// A single key
    Key,
    /// Every key under a prefix
    KeyPrefix,
}

impl QueryKind {
    /// The watch plan type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Key => "key",
            QueryKind::KeyPrefix => "keyprefix",
        }
    }
}

/// Result of one (possibly blocking) query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    /// The `X-Consul-Index` of the response
    pub index: u64,
    /// `None` when the key or prefix holds no data
    pub payload: Option<WatchPayload>,
}

/// Client for the Consul KV HTTP API.
///
/// # Examples
///
/// ```rust,no_run
/// use harvestcfg::adapters::consul::ConsulClient;
///
/// # #[tokio::main]
/// # async fn main() -> harvestcfg::domain::Result<()> {
/// let client = ConsulClient::new("127.0.0.1:8500", "", "", None)?;
/// if let Some(entry) = client.get("app/log-level").await? {
///     println!("{} = {} (index {})", entry.key, entry.value, entry.modify_index);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConsulClient {
    http: reqwest::Client,
    base_url: String,
    datacenter: String,
    token: String,
    wait: Option<Duration>,
}

impl ConsulClient {
    /// Creates a client for the agent at `address` (`host:port` or a URL).
    ///
    /// Empty `datacenter` and `token` are omitted from requests. `wait` bounds
    /// how long a blocking query may be held by the server.
    pub fn new(address: &str, datacenter: &str, token: &str, wait: Option<Duration>) -> Result<Self> {
        if address.is_empty() {
            return Err(ConfigError::invalid_argument("address is empty"));
        }
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::SourceError {
                source_name: "consul".to_string(),
                message: format!("Failed to create Consul client: {}", e),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            http,
            base_url,
            datacenter: datacenter.to_string(),
            token: token.to_string(),
            wait,
        })
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_timeout(&self, index: u64) -> Duration {
        if index == 0 {
            return LOOKUP_TIMEOUT;
        }
        let wait = self.wait.unwrap_or(SERVER_DEFAULT_WAIT);
        wait + wait / 16 + REQUEST_SLACK
    }

    /// Runs one query. With `index > 0` Consul holds the request until the
    /// data changes past that index or the wait time elapses.
    pub async fn query(
        &self,
        kind: QueryKind,
        path: &str,
        index: u64,
    ) -> std::result::Result<QueryResponse, ConsulError> {
        let url = format!("{}/v1/kv/{}", self.base_url, path.trim_start_matches('/'));

        let mut params: Vec<(&str, String)> = Vec::new();
        if !self.datacenter.is_empty() {
            params.push(("dc", self.datacenter.clone()));
        }
        if index > 0 {
            params.push(("index", index.to_string()));
            if let Some(wait) = self.wait {
                params.push(("wait", format!("{}ms", wait.as_millis())));
            }
        }
        if kind == QueryKind::KeyPrefix {
            params.push(("recurse", "true".to_string()));
        }

        let mut request = self
            .http
            .get(&url)
            .query(&params)
            .timeout(self.request_timeout(index));
        if !self.token.is_empty() {
            request = request.header(TOKEN_HEADER, self.token.as_str());
        }

        let response = request.send().await?;
        let index = response
            .headers()
            .get(INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        match response.status() {
            StatusCode::NOT_FOUND => Ok(QueryResponse {
                index,
                payload: None,
            }),
            StatusCode::OK => {
                let body = response.bytes().await?;
                let raw: Vec<RawEntry> = serde_json::from_slice(&body)
                    .map_err(|e| ConsulError::Invalid(format!("malformed KV listing: {}", e)))?;
                let entries = raw
                    .into_iter()
                    .map(KvEntry::try_from)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let payload = match kind {
                    QueryKind::Key => entries.into_iter().next().map(WatchPayload::Entry),
                    QueryKind::KeyPrefix => Some(WatchPayload::Entries(entries)),
                };
                Ok(QueryResponse { index, payload })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ConsulError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// Reads one key without blocking.
    pub async fn get(&self, key: &str) -> Result<Option<KvEntry>> {
        let response = self.query(QueryKind::Key, key, 0).await?;
        match response.payload {
            Some(WatchPayload::Entry(entry)) => Ok(Some(entry)),
            Some(WatchPayload::Entries(_)) | None => Ok(None),
        }
    }
}

/// Seeding getter backed by Consul. Reports each key's `ModifyIndex` as version.
#[derive(Debug, Clone)]
pub struct ConsulGetter {
    client: ConsulClient,
}

impl ConsulGetter {
    /// Creates a getter for the agent at `address`.
    pub fn new(address: &str, datacenter: &str, token: &str, wait: Option<Duration>) -> Result<Self> {
        Ok(Self {
            client: ConsulClient::new(address, datacenter, token, wait)?,
        })
    }

    /// Wraps an existing client.
    pub fn from_client(client: ConsulClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Getter for ConsulGetter {
    async fn get(&self, key: &str) -> Result<(Option<String>, u64)> {
        match self.client.get(key).await? {
            Some(entry) => Ok((Some(entry.value), entry.modify_index)),
            None => Ok((None, 0)),
        }
    }
}
