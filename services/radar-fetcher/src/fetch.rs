//! Conditional download of the latest composite.
//!
//! DWD serves the newest composite of each product under a fixed "latest"
//! URL and tags every file with an ETag. Sending the last seen tag as
//! `If-None-Match` lets the server answer 304 when nothing changed, so
//! unchanged composites are neither transferred nor decoded.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use crate::product::latest_file_name;

/// Open data directory holding one subdirectory per product.
pub const DEFAULT_BASE_URL: &str = "https://opendata.dwd.de/weather/radar/radolan";

/// Why a fetch did not produce a composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    /// HTTP status, `None` for transport errors
    pub status: Option<u16>,
    pub reason: String,
}

impl FetchFailure {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: reason.into(),
        }
    }

    pub fn from_status(status: StatusCode) -> Self {
        Self {
            status: Some(status.as_u16()),
            reason: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

/// Result of one conditional fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// A new composite and its entity tag, if the server sent one
    Fresh { body: Bytes, etag: Option<String> },
    /// The cached entity tag is still current
    NotModified,
    Failed(FetchFailure),
}

impl FetchOutcome {
    pub fn is_fresh(&self) -> bool {
        matches!(self, FetchOutcome::Fresh { .. })
    }
}

/// Source of composite files.
#[async_trait]
pub trait CompositeSource: Send + Sync {
    /// Fetch the latest composite of `product_code`.
    ///
    /// `etag` is the tag of the last composite received; when present the
    /// source may answer `NotModified`. Never retries.
    async fn fetch_latest(&self, product_code: &str, etag: Option<&str>) -> FetchOutcome;
}

/// Fetches composites from the DWD open data server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCompositeSource {
    client: Client,
    base_url: String,
}

impl HttpCompositeSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the latest composite of a product.
    pub fn url_for(&self, product_code: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            product_code,
            latest_file_name(product_code)
        )
    }
}

#[async_trait]
impl CompositeSource for HttpCompositeSource {
    async fn fetch_latest(&self, product_code: &str, etag: Option<&str>) -> FetchOutcome {
        let url = self.url_for(product_code);

        let mut request = self.client.get(&url);
        if let Some(etag) = etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }

        debug!(url = %url, conditional = etag.is_some(), "Fetching composite");

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Composite request failed");
                return FetchOutcome::Failed(FetchFailure::transport(e.to_string()));
            }
        };

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                debug!(url = %url, "Composite not modified");
                FetchOutcome::NotModified
            }
            StatusCode::OK => {
                let etag = response
                    .headers()
                    .get(header::ETAG)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);

                match response.bytes().await {
                    Ok(body) => {
                        debug!(url = %url, bytes = body.len(), etag = ?etag, "Composite downloaded");
                        FetchOutcome::Fresh { body, etag }
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "Reading composite body failed");
                        FetchOutcome::Failed(FetchFailure {
                            status: Some(StatusCode::OK.as_u16()),
                            reason: format!("body read failed: {}", e),
                        })
                    }
                }
            }
            status => {
                warn!(url = %url, status = status.as_u16(), "Unexpected composite response");
                FetchOutcome::Failed(FetchFailure::from_status(status))
            }
        }
    }
}
