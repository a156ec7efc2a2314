//! REST adapters for the catalog provider and scope persistence ports.
//!
//! Transport retries are left to the caller; every failure is reported once
//! with the server's error message when it sent one.

use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::catalog::CatalogProvider;
use crate::config::ServerConfig;
use crate::engine::ScopePersistence;
use crate::errors::ScopeError;
use crate::types::{CatalogPage, SavePayload, ScopeResponse};

const CONFIG_PATH: &str = "/rest/ai-reviewer/1.0/config";
const CATALOG_PATH: &str = "/rest/ai-reviewer/1.0/config/repository-catalog";
const SCOPE_PATH: &str = "/rest/ai-reviewer/1.0/config/scope";

/// Thin client shared by both ports.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl RestClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ScopeError> {
        let base_url =
            Url::parse(base_url.trim_end_matches('/')).map_err(|e| ScopeError::ConfigEnv {
                message: format!("invalid server base URL '{base_url}': {e}"),
            })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ScopeError::catalog_unavailable)?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn from_config(server: &ServerConfig) -> Result<Self, ScopeError> {
        let base_url = server.base_url.as_deref().ok_or_else(|| ScopeError::ConfigEnv {
            message: "no server base URL configured (set [server] base_url or REPOSCOPE_BASE_URL)"
                .to_string(),
        })?;
        Self::new(
            base_url,
            server.token.clone(),
            Duration::from_secs(server.timeout_secs),
        )
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and decode, returning the failure as a plain message.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, String> {
        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(describe_failure(status, &body));
        }
        response.json::<T>().await.map_err(|e| e.to_string())
    }
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    match status {
        StatusCode::UNAUTHORIZED => format!("unauthorized (token missing or expired): {detail}"),
        StatusCode::FORBIDDEN => format!("forbidden (administrator access required): {detail}"),
        _ if detail.is_empty() => format!("HTTP {status}"),
        _ => format!("HTTP {status}: {detail}"),
    }
}

/// Reads the paginated repository catalog.
#[derive(Debug, Clone)]
pub struct RestCatalogProvider {
    client: RestClient,
}

impl RestCatalogProvider {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

impl CatalogProvider for RestCatalogProvider {
    async fn fetch_page(&self, start: usize, limit: usize) -> Result<CatalogPage, ScopeError> {
        let mut url = self.client.url(CATALOG_PATH);
        url.query_pairs_mut()
            .append_pair("start", &start.to_string())
            .append_pair("limit", &limit.to_string());
        debug!("GET {}", url);
        self.client
            .send(self.client.request(Method::GET, url))
            .await
            .map_err(ScopeError::catalog_unavailable)
    }
}

/// Reads and writes the persisted scope.
#[derive(Debug, Clone)]
pub struct RestScopePersistence {
    client: RestClient,
}

impl RestScopePersistence {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

impl ScopePersistence for RestScopePersistence {
    async fn load_current(&self) -> Result<ScopeResponse, ScopeError> {
        let url = self.client.url(CONFIG_PATH);
        debug!("GET {}", url);
        self.client
            .send(self.client.request(Method::GET, url))
            .await
            .map_err(ScopeError::scope_unavailable)
    }

    async fn save(&self, payload: &SavePayload) -> Result<ScopeResponse, ScopeError> {
        let url = self.client.url(SCOPE_PATH);
        debug!(
            "POST {} ({} repositories, mode {})",
            url,
            payload.repositories.len(),
            payload.mode
        );
        self.client
            .send(self.client.request(Method::POST, url).json(payload))
            .await
            .map_err(ScopeError::save_rejected)
    }
}
