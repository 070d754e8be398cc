/// Catalog client — the single point of entry for calls to the remote plant catalog.
///
/// The cache talks to the `CatalogService` trait only; `HttpCatalogClient` is the
/// production implementation backed by the json-server style REST API.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::plant::{CatalogEntry, EnvironmentTag};

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Catalog service returned status {status}")]
    Service { status: u16 },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Catalog service returned no data")]
    EmptyResponse,
}

impl CatalogError {
    /// Transport, status and payload failures all mean "try again later".
    pub fn is_network(&self) -> bool {
        !matches!(self, CatalogError::EmptyResponse)
    }

    /// Transport failures and 5xx are retried. Anything else is final.
    fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Network(_) => true,
            CatalogError::Service { status } => *status >= 500,
            CatalogError::Parse(_) | CatalogError::EmptyResponse => false,
        }
    }
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// One page of plants sorted by name ascending. Pages are 1-indexed.
    async fn fetch_plants(&self, page: u32, limit: u32) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// The environment tags sorted by title ascending.
    async fn fetch_environments(&self) -> Result<Vec<EnvironmentTag>, CatalogError>;
}

#[derive(Clone)]
pub struct HttpCatalogClient {
    client: Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
        })
    }

    /// Issues a GET and decodes the body.
    /// Retries transport failures and 5xx with exponential backoff; the last
    /// attempt's error is returned as is.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut attempt = 1;

        loop {
            match self.get_once(&url, path, query).await {
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    // 200ms, 400ms
                    let delay = Duration::from_millis(200 * (1 << (attempt - 1)));
                    warn!(
                        "Catalog call attempt {} failed ({}), retrying after {}ms...",
                        attempt,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Catalog service returned {} for {}", status, path);
            return Err(CatalogError::Service {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let payload: Option<T> = if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            serde_json::from_slice(&body)?
        };

        debug!("Catalog call to {} succeeded ({} bytes)", path, body.len());
        payload.ok_or(CatalogError::EmptyResponse)
    }
}

#[async_trait]
impl CatalogService for HttpCatalogClient {
    async fn fetch_plants(&self, page: u32, limit: u32) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.get_json(
            "plants",
            &[
                ("_sort", "name".to_string()),
                ("_order", "asc".to_string()),
                ("_page", page.to_string()),
                ("_limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn fetch_environments(&self) -> Result<Vec<EnvironmentTag>, CatalogError> {
        self.get_json(
            "plants_environments",
            &[("_sort", "title".to_string()), ("_order", "asc".to_string())],
        )
        .await
    }
}
