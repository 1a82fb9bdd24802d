//! Typed client for the Presentation, Storage and IIIF APIs
//!
//! An [`ApiContext`] is built once per worker and passed explicitly to
//! everything that talks to the service; there is no shared global request
//! context.

mod deposits;
mod models;
mod repository;

pub use deposits::{DepositStatusSource, ImportJobStatusSource, LockOutcome, MetsDocument};
pub use models::{
    ArchivalGroup, Binary, Container, Deposit, DepositHandle, DepositPatch, ImportJob, ImportJobResult,
    MetsItem, NewDeposit, ObjectVersion,
};
pub use repository::{IiifManifestSource, StoredContent};

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::auth::TokenProvider;
use crate::config::{ApiConfig, ClientCredentials, HarnessConfig};
use crate::error::{Error, Result};

/// Per-worker API context
#[derive(Clone)]
pub struct ApiContext {
    http: reqwest::Client,
    tokens: Arc<TokenProvider>,
    config: ApiConfig,
}

impl ApiContext {
    /// Context acting as the primary identity
    pub fn new(config: &HarnessConfig) -> Result<Self> {
        Self::for_identity(config, config.auth.primary.clone())
    }

    /// Context acting as another client identity
    pub fn for_identity(config: &HarnessConfig, credentials: ClientCredentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.request_timeout_secs))
            .build()?;
        let tokens = Arc::new(TokenProvider::new(http.clone(), &config.auth, credentials));
        Ok(Self::from_parts(http, tokens, config.api.clone()))
    }

    pub fn from_parts(http: reqwest::Client, tokens: Arc<TokenProvider>, config: ApiConfig) -> Self {
        Self { http, tokens, config }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Client id of the identity this context acts as
    pub fn identity(&self) -> &str {
        self.tokens.client_id()
    }

    /// Absolute Presentation API URL for a path
    pub fn url(&self, path: &str) -> String {
        join_url(&self.config.base_url, path)
    }

    /// Repository path of `slug` under the configured test root
    pub fn test_path(&self, slug: &str) -> String {
        crate::storage::join_key(&self.config.test_root, slug)
    }

    /// Request with bearer auth headers attached
    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let headers = self.tokens.auth_headers().await?;
        debug!("{} {}", method, url);
        Ok(self.http.request(method, url).headers(headers))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.request(Method::GET, url).await?.send().await?;
        let resp = check_status(resp, &Method::GET, url).await?;
        Ok(resp.json().await?)
    }

    /// GET that maps 404 to `None`
    async fn try_get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        match self.get_json(url).await {
            Ok(value) => Ok(Some(value)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Wait until `GET /health` succeeds
    pub async fn wait_until_healthy(&self, policy: &crate::poll::PollPolicy) -> Result<()> {
        let url = self.url("health");
        let url = url.as_str();
        let http = &self.http;
        crate::poll::poll_until(&format!("health of {}", self.config.base_url), policy, move || async move {
            let resp = http.get(url).send().await?;
            if resp.status().is_success() {
                Ok(crate::poll::Attempt::Ready(()))
            } else {
                Ok(crate::poll::Attempt::Pending(resp.status().to_string()))
            }
        })
        .await
    }
}

/// Join a base URL and a path with exactly one slash
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Map non-success responses onto harness errors
async fn check_status(resp: Response, method: &Method, url: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => Err(Error::NotFound(format!("{} {}", method, url))),
        StatusCode::CONFLICT => Err(Error::Conflict(format!("{} {}: {}", method, url, body))),
        StatusCode::UNAUTHORIZED => Err(Error::Auth(format!("{} {} rejected the bearer token", method, url))),
        _ => Err(Error::UnexpectedStatus {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            body,
        }),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    /// API context whose API and token endpoint both live on `server`
    pub async fn context(server: &MockServer) -> ApiContext {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200).json_body(json!({
                    "access_token": "test-token",
                    "expires_in": 3600
                }));
            })
            .await;

        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenProvider::with_endpoint(
            http.clone(),
            server.url("/token"),
            "api://preservation/.default",
            ClientCredentials {
                client_id: "harness".to_string(),
                client_secret: "secret".to_string(),
            },
        ));
        let config = ApiConfig {
            base_url: server.base_url(),
            storage_url: server.url("/storage"),
            iiif_url: server.url("/iiif"),
            ..Default::default()
        };
        ApiContext::from_parts(http, tokens, config)
    }
}
