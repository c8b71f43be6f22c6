//! Authenticated HTTP client
//!
//! Issues logical requests against the API and transparently recovers from
//! an expired session: a 401 triggers a (shared) credential refresh followed
//! by exactly one replay of the original request.

use reqwest::header::{HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, COOKIE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::refresh::{HttpRefresher, Refresher, TokenRefreshCoordinator};
use super::request::ApiRequest;
use super::response::{into_http_error, read_error_body, read_success, ResponseBody};
use crate::metrics;
use crate::utils::error::FetchError;
use crate::utils::{merge_cookie, resolve_url};

// ============================================================================
// Client Configuration
// ============================================================================

/// How the session credential travels between this process and the API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    /// Cookies live in the client's own cookie jar; the refresh response
    /// updates the jar and the replay picks the new cookie up from there.
    #[default]
    CookieJar,

    /// The caller forwards a `Cookie` header per request (server-side
    /// rendering). The replay carries the cookie the refresh response set.
    ForwardedHeader,
}

/// Configuration for the authenticated client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Base URL that relative request targets are resolved against
    pub api_base_url: String,

    /// Path of the session refresh endpoint
    pub refresh_path: String,

    /// Credential propagation mode
    pub credential_mode: CredentialMode,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:8000")
    }
}

impl HttpClientConfig {
    /// Create a new client config
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            refresh_path: String::from("/auth/refresh-token"),
            credential_mode: CredentialMode::CookieJar,
            request_timeout_secs: 30,
        }
    }

    /// Set credential mode
    pub fn with_credential_mode(mut self, mode: CredentialMode) -> Self {
        self.credential_mode = mode;
        self
    }

    /// Set refresh endpoint path
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Absolute URL of the refresh endpoint
    pub fn refresh_url(&self) -> String {
        resolve_url(&self.api_base_url, &self.refresh_path)
    }
}

// ============================================================================
// Authenticated Client
// ============================================================================

/// HTTP client with single-flight session refresh
pub struct AuthenticatedHttpClient {
    config: HttpClientConfig,
    http_client: Client,
    coordinator: Arc<TokenRefreshCoordinator>,
}

impl AuthenticatedHttpClient {
    /// Create a client that refreshes against the configured endpoint
    pub fn new(config: HttpClientConfig) -> Result<Self, FetchError> {
        let http_client = build_http_client(&config)?;
        let refresher = Arc::new(HttpRefresher::new(
            http_client.clone(),
            config.refresh_url(),
        ));

        Ok(Self {
            coordinator: Arc::new(TokenRefreshCoordinator::new(refresher)),
            config,
            http_client,
        })
    }

    /// Create a client with a custom refresher
    pub fn with_refresher(
        config: HttpClientConfig,
        refresher: Arc<dyn Refresher>,
    ) -> Result<Self, FetchError> {
        let http_client = build_http_client(&config)?;

        Ok(Self {
            coordinator: Arc::new(TokenRefreshCoordinator::new(refresher)),
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Refresh coordinator shared by every request issued through this client
    pub fn coordinator(&self) -> &Arc<TokenRefreshCoordinator> {
        &self.coordinator
    }

    /// Issue a request, refreshing the session and replaying once on 401
    pub async fn issue(&self, request: &ApiRequest) -> Result<ResponseBody, FetchError> {
        let response = self.send(request, None).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return finish(response).await;
        }

        debug!(
            method = %request.method,
            path = %request.target,
            "Received 401, refreshing credentials"
        );

        let outcome = match self.coordinator.get_or_start(request.cookie()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::record_auth_exhausted();
                warn!(path = %request.target, error = %e, "Session refresh failed");
                return Err(FetchError::auth_exhausted(e));
            }
        };

        let replay_cookie = match self.config.credential_mode {
            CredentialMode::ForwardedHeader => outcome
                .cookie
                .as_deref()
                .map(|fresh| merge_cookie(request.cookie(), fresh)),
            CredentialMode::CookieJar => None,
        };

        metrics::record_replay();
        let response = self.send(request, replay_cookie.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let body = read_error_body(response).await;
            metrics::record_auth_exhausted();
            warn!(path = %request.target, "Still unauthorized after session refresh");
            return Err(FetchError::auth_exhausted(FetchError::Http { status: 401, body }));
        }

        finish(response).await
    }

    /// Issue a request and deserialize the body into `T`
    pub async fn issue_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, FetchError> {
        self.issue(request).await?.into_typed()
    }

    /// Issue a request that the caller may abandon through `cancel`
    ///
    /// Abandoning never disturbs a refresh that is already running for other
    /// callers.
    pub async fn issue_with_cancel(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ResponseBody, FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(path = %request.target, "Request abandoned by caller");
                Err(FetchError::Cancelled)
            }
            result = self.issue(request) => result,
        }
    }

    async fn send(
        &self,
        request: &ApiRequest,
        cookie_override: Option<&str>,
    ) -> Result<Response, FetchError> {
        let url = resolve_url(&self.config.api_base_url, &request.target);
        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .header(CACHE_CONTROL, "no-store");

        for (name, value) in &request.headers {
            if cookie_override.is_some() && name.eq_ignore_ascii_case("cookie") {
                continue;
            }
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::InvalidRequest(format!("header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError::InvalidRequest(format!("header value: {e}")))?;
            builder = builder.header(name, value);
        }

        if let Some(cookie) = cookie_override {
            builder = builder.header(COOKIE, cookie);
        }

        // Caller-supplied content type wins
        if (request.expects_body() || request.body.is_some())
            && request.header(CONTENT_TYPE.as_str()).is_none()
        {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| {
            debug!(url = %url, error = %e, "Request failed before a response arrived");
            FetchError::from(e)
        })?;

        metrics::record_response(response.status().as_u16());
        Ok(response)
    }
}

fn build_http_client(config: &HttpClientConfig) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(config.timeout())
        .gzip(true)
        .cookie_store(config.credential_mode == CredentialMode::CookieJar)
        .build()
        .map_err(|e| FetchError::InvalidRequest(format!("failed to build HTTP client: {e}")))
}

async fn finish(response: Response) -> Result<ResponseBody, FetchError> {
    if response.status().is_success() {
        read_success(response).await
    } else {
        Err(into_http_error(response).await)
    }
}

// ============================================================================
// Tests
// ============================================================================
