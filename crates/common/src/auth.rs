//! Client-credentials token provider
//!
//! Each worker owns one provider. Tokens are cached until shortly before
//! they expire. A failed exchange is an authentication error and is never
//! retried.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{AuthConfig, ClientCredentials};
use crate::error::{Error, Result};

/// Refresh this long before the advertised expiry
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Used when the identity provider omits `expires_in`
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: Option<u64>,
}

/// Token endpoint error body
#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Acquires and caches bearer tokens for one client identity
pub struct TokenProvider {
    http_client: reqwest::Client,
    token_endpoint: String,
    scope: String,
    credentials: ClientCredentials,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http_client: reqwest::Client, config: &AuthConfig, credentials: ClientCredentials) -> Self {
        Self::with_endpoint(http_client, config.token_endpoint(), &config.scope, credentials)
    }

    /// Provider for an explicit token endpoint
    pub fn with_endpoint(
        http_client: reqwest::Client,
        token_endpoint: impl Into<String>,
        scope: &str,
        credentials: ClientCredentials,
    ) -> Self {
        Self {
            http_client,
            token_endpoint: token_endpoint.into(),
            scope: scope.to_string(),
            credentials,
            cached: Mutex::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    /// Headers carrying a bearer token valid at the time of return
    pub async fn auth_headers(&self) -> Result<HeaderMap> {
        let token = self.access_token().await?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| Error::Auth(format!("token is not a valid header value: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Current access token, acquiring a new one when the cache is stale
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + EXPIRY_SKEW < token.expires_at {
                return Ok(token.access_token.clone());
            }
            debug!("Cached token for {} is stale", self.credentials.client_id);
        }

        let token = self.fetch_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Drop the cached token so the next call re-authenticates
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let resp = self
            .http_client
            .post(&self.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<TokenError>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                },
                Err(_) => body,
            };
            return Err(Error::Auth(format!("{} ({})", reason, status)));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::Auth(format!("malformed token response: {}", e)))?;

        if let Some(kind) = token.token_type.as_deref() {
            if !kind.eq_ignore_ascii_case("bearer") {
                return Err(Error::Auth(format!("unsupported token type '{}'", kind)));
            }
        }

        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LIFETIME);
        info!(
            "Acquired token for {} (expires in {}s)",
            self.credentials.client_id,
            lifetime.as_secs()
        );

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }
}
