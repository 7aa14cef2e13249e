use log::{debug, error};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ApiError;
use crate::models::Credentials;

/// A page of results from a Helix list endpoint.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HelixErrorBody {
    message: Option<String>,
}

/// Authenticated client for the Helix API.
#[derive(Debug, Clone)]
pub struct HelixClient {
    http: Client,
    base_url: String,
    credentials: Credentials,
}

impl HelixClient {
    pub fn new(http: Client, base_url: &str, credentials: Credentials) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Adds the `Client-ID` and bearer headers.
    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Client-ID", &self.credentials.client_id)
            .bearer_auth(&self.credentials.token)
    }

    /// Sends a GET to `<base>/<path>`. Statuses >= 400 become `ApiError::Upstream`.
    pub async fn get_raw(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Response, ApiError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("GET {} {:?}", url, query);
        let resp = self.authorize(self.http.get(&url).query(query)).send().await?;
        check_status(path, resp).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let resp = self.get_raw(path, query).await?;
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::malformed(path, e))
    }
}

/// Turns an error status into `ApiError::Upstream`, keeping the upstream message.
pub async fn check_status(endpoint: &str, resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.as_u16() < 400 {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<HelixErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
    error!("{} returned status {}: {}", endpoint, status.as_u16(), message);
    Err(ApiError::Upstream {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        message,
    })
}
