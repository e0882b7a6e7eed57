//! Manifest transport
//!
//! The manifest is the single source of truth for where live code lives, so
//! every request bypasses HTTP caches.

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use std::time::Duration;
use tracing::debug;

/// Raw response from a manifest request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetches the manifest document
#[async_trait]
pub trait ManifestTransport: Send + Sync {
    /// GET `url`; `Err` carries a network-level failure description
    async fn get(&self, url: &str) -> Result<TransportResponse, String>;
}

/// HTTP transport with caching disabled
pub struct HttpManifestTransport {
    client: reqwest::Client,
}

impl HttpManifestTransport {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn cache_busted(url: &str) -> String {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}_ts={}",
            url,
            separator,
            chrono::Utc::now().timestamp_millis()
        )
    }

    /// GET request for `url` with cache-disabling headers and a fresh buster
    fn build_request(&self, url: &str) -> reqwest::Result<reqwest::Request> {
        self.client
            .get(Self::cache_busted(url))
            .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .header(PRAGMA, "no-cache")
            .build()
    }
}

#[async_trait]
impl ManifestTransport for HttpManifestTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, String> {
        let request = self.build_request(url).map_err(|e| e.to_string())?;
        debug!(url = %request.url(), "requesting manifest");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| e.to_string())?;

        Ok(TransportResponse::new(status, body.to_vec()))
    }
}
