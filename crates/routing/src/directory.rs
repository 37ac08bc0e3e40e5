//! Directory client
//!
//! Thin HTTP client for the external handle directory. Maps a handle to
//! its tenant identity (including any declared custom domain) and a raw
//! hostname back to a handle. Stateless by design: callers wrap results
//! through the cache, which keeps this component testable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Initial backoff for hostname-resolution retries (100ms)
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Maximum backoff between retries (2 seconds)
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// A tenant record as the directory reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantIdentity {
    pub handle: String,
    /// Custom domain the tenant has declared, if any. Declared is not
    /// verified; the verifier decides whether to honor it.
    #[serde(default)]
    pub custom_domain: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("directory returned status {0}")]
    Status(reqwest::StatusCode),
}

impl DirectoryError {
    /// Transient errors are worth retrying on the flaky
    /// hostname-resolution path
    pub fn is_transient(&self) -> bool {
        match self {
            DirectoryError::Http(_) => true,
            DirectoryError::Status(status) => status.is_server_error(),
        }
    }
}

/// Handle directory lookups, substitutable in tests
#[async_trait]
pub trait Directory: Send + Sync {
    /// Identity for a handle, or `None` when the handle is unknown
    async fn resolve_handle(
        &self,
        handle: &str,
    ) -> Result<Option<TenantIdentity>, DirectoryError>;

    /// Handle owning a raw hostname, or `None` when no tenant claims it
    async fn resolve_hostname(&self, hostname: &str) -> Result<Option<String>, DirectoryError>;
}

#[derive(Debug, Deserialize)]
struct HostnameRecord {
    handle: String,
}

/// HTTP implementation against the external directory
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
    retry_count: usize,
}

impl DirectoryClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        retry_count: usize,
    ) -> Result<Self, DirectoryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_count,
        })
    }

    async fn fetch_handle(&self, handle: &str) -> Result<Option<TenantIdentity>, DirectoryError> {
        let url = format!("{}/handles/{}", self.base_url, handle);
        let response = self.http.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(DirectoryError::Status(response.status()));
        }

        Ok(Some(response.json::<TenantIdentity>().await?))
    }

    async fn fetch_hostname(&self, hostname: &str) -> Result<Option<String>, DirectoryError> {
        let url = format!("{}/hostnames/{}", self.base_url, hostname);
        let response = self.http.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(DirectoryError::Status(response.status()));
        }

        Ok(Some(response.json::<HostnameRecord>().await?.handle))
    }
}

#[async_trait]
impl Directory for DirectoryClient {
    async fn resolve_handle(
        &self,
        handle: &str,
    ) -> Result<Option<TenantIdentity>, DirectoryError> {
        self.fetch_handle(handle).await
    }

    /// Hostname lookups sit behind DNS-backed indexing and flake; retry
    /// transient failures a fixed small number of times with
    /// exponential backoff. Not-found is terminal, never retried.
    async fn resolve_hostname(&self, hostname: &str) -> Result<Option<String>, DirectoryError> {
        use tokio_retry::strategy::{jitter, ExponentialBackoff};
        use tokio_retry::Retry;

        let retry_strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY.as_millis() as u64)
            .max_delay(RETRY_MAX_DELAY)
            .take(self.retry_count)
            .map(jitter);

        Retry::spawn(retry_strategy, || async {
            let result = self.fetch_hostname(hostname).await;

            match &result {
                Ok(_) => Ok(result),
                Err(e) if e.is_transient() => {
                    tracing::debug!(
                        hostname = %hostname,
                        error = %e,
                        "Transient error - will retry"
                    );
                    Err(result) // Return error to trigger retry
                }
                Err(e) => {
                    tracing::debug!(
                        hostname = %hostname,
                        error = %e,
                        "Permanent error - will not retry"
                    );
                    Ok(result) // Return error wrapped in Ok to stop retrying
                }
            }
        })
        .await
        .unwrap_or_else(|e| e) // Extract the inner result
    }
}
