//! Content-addressed retrieval of uploaded blobs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::{Result, ToolkitError};

pub const DEFAULT_GATEWAY: &str = "https://gateway.irys.xyz/";

/// Bytes served for a content id, with the type the gateway reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Fetch `content_id`. Unknown ids are `NotFound`; nothing is retried.
    async fn fetch(&self, content_id: &str) -> Result<Blob>;
}

/// Base URL with exactly one trailing `/`, so `{base}{id}` is well formed.
pub fn normalize_base(base: &str) -> String {
    let trimmed = base.trim().trim_end_matches('/');
    format!("{trimmed}/")
}

pub struct HttpGateway {
    client: Client,
    base: String,
}

impl HttpGateway {
    pub fn new(base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base: normalize_base(base),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url_for(&self, content_id: &str) -> String {
        format!("{}{}", self.base, content_id)
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn fetch(&self, content_id: &str) -> Result<Blob> {
        if content_id.trim().is_empty() {
            return Err(ToolkitError::validation("content id must not be empty"));
        }
        let url = self.url_for(content_id.trim());
        tracing::debug!(url = %url, "fetching from gateway");
        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(ToolkitError::NotFound(content_id.to_string())),
            status if !status.is_success() => {
                return Err(ToolkitError::Network(format!(
                    "gateway returned {status} for {content_id}"
                )))
            }
            _ => {}
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        tracing::debug!(content_id, size = bytes.len(), "gateway fetch complete");
        Ok(Blob {
            bytes,
            content_type,
        })
    }
}
