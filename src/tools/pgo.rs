//! PGO profile download

use crate::tools::ToolError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Fetches a named optimization profile
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, ToolError>;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest silence allowed between chunks of a response
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches profiles over HTTPS from the optimization-profile bucket
pub struct HttpProfileFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProfileFetcher {
    pub fn new(base_url: impl Into<String>, ssl_verification: bool) -> Result<Self, ToolError> {
        Self::with_read_timeout(base_url, ssl_verification, READ_TIMEOUT)
    }

    /// A stalled response fails with a transient `Network` error after `read_timeout`
    pub fn with_read_timeout(
        base_url: impl Into<String>,
        ssl_verification: bool,
        read_timeout: Duration,
    ) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!ssl_verification)
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| ToolError::Network(format!("could not build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn profile_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }
}

#[async_trait]
impl ProfileFetcher for HttpProfileFetcher {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, ToolError> {
        let url = self.profile_url(name);
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::Network(format!("{}: {}", url, e)))?;

        check_status(&url, response.status())?;

        let body = response
            .bytes()
            .await
            .map_err(|e| ToolError::Network(format!("{}: {}", url, e)))?;
        Ok(body.to_vec())
    }
}

/// Server errors are worth retrying, any other failure status is not
fn check_status(url: &str, status: reqwest::StatusCode) -> Result<(), ToolError> {
    if status.is_server_error() {
        return Err(ToolError::Network(format!("{}: HTTP {}", url, status)));
    }
    if !status.is_success() {
        return Err(ToolError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}
