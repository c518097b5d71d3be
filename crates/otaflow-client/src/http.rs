//! HTTP client for the otaflow daemon

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use otaflow_api::{
    requests::TriggerRequest,
    responses::{ApiError, HealthResponse, StatusResponse},
};

use crate::error::{ClientError, Result};

/// HTTP client for communicating with the otaflow daemon
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    /// Create a new HTTP client
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new HTTP client with custom `reqwest::Client`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn with_client(base_url: impl AsRef<str>, client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(ClientError::Url)
    }

    /// Turn a non-success response into `ClientError::Api`
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ApiError>(&body) {
            Ok(err) => (Some(err.code), err.message),
            Err(_) => (None, body),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        debug!(url = %url, "GET");
        let response = Self::check(self.client.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Check daemon health
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health").await
    }

    /// Current update status
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn status(&self) -> Result<StatusResponse> {
        self.get("/api/v1/ota").await
    }

    /// Start a firmware update
    ///
    /// # Errors
    /// Returns `ClientError::Api` if the daemon rejects the trigger.
    pub async fn trigger(&self, request: &TriggerRequest) -> Result<()> {
        let url = self.url("/api/v1/ota/trigger")?;
        debug!(url = %url, firmware = %request.url, "POST");
        Self::check(self.client.post(url).json(request).send().await?).await?;
        Ok(())
    }

    /// Cancel the update in flight
    ///
    /// # Errors
    /// Returns `ClientError::Api` if nothing is running.
    pub async fn abort(&self) -> Result<()> {
        let url = self.url("/api/v1/ota/abort")?;
        debug!(url = %url, "POST");
        Self::check(self.client.post(url).send().await?).await?;
        Ok(())
    }
}
