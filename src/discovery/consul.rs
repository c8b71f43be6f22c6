//! Consul agent backend
//!
//! Talks to the local Consul agent over its HTTP API:
//! - `PUT /v1/agent/service/register`
//! - `PUT /v1/agent/service/deregister/{id}`
//! - `GET /v1/health/service/{name}?passing=true`

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::backend::{HealthyInstance, RegistryBackend, ServiceRegistration};
use super::config::RegistryConfig;
use crate::utils::error::RegistryError;

// ============================================================================
// Health Endpoint Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthEntry {
    #[serde(default)]
    node: Option<NodeEntry>,
    service: ServiceEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeEntry {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceEntry {
    #[serde(default)]
    address: String,
    port: u16,
}

impl HealthEntry {
    // An empty service address means "same as the node".
    fn into_instance(self) -> HealthyInstance {
        let host = if self.service.address.is_empty() {
            self.node.map(|n| n.address).unwrap_or_default()
        } else {
            self.service.address
        };
        HealthyInstance::new(host, self.service.port)
    }
}

// ============================================================================
// Consul Backend
// ============================================================================

/// Registry backend backed by a Consul agent
pub struct ConsulBackend {
    http_client: Client,
    base_url: Url,
}

impl ConsulBackend {
    /// Create a backend for the agent named in `config`
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        Self::with_base_url(config.backend_url(), config.backend_timeout())
    }

    /// Create a backend for an explicit agent URL
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Backend(format!("failed to build HTTP client: {e}")))?;

        let base_url: String = base_url.into();
        let base_url = Url::parse(&base_url)
            .map_err(|e| RegistryError::Backend(format!("invalid agent URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::Backend(format!(
                "agent URL cannot carry a path: {base_url}"
            )));
        }

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Agent URL with `segments` appended, each percent-encoded as one segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RegistryError::Backend(format!("agent URL cannot carry a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl RegistryBackend for ConsulBackend {
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), RegistryError> {
        let url = self.endpoint(&["v1", "agent", "service", "register"])?;
        let response = self
            .http_client
            .put(url)
            .json(registration)
            .send()
            .await
            .map_err(|e| RegistryError::Backend(e.to_string()))?;

        ensure_success(response, "register").await
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError> {
        let url = self.endpoint(&["v1", "agent", "service", "deregister", instance_id])?;
        let response = self
            .http_client
            .put(url)
            .send()
            .await
            .map_err(|e| RegistryError::Backend(e.to_string()))?;

        ensure_success(response, "deregister").await
    }

    async fn healthy_instances(
        &self,
        service_name: &str,
    ) -> Result<Vec<HealthyInstance>, RegistryError> {
        let url = self.endpoint(&["v1", "health", "service", service_name])?;
        let response = self
            .http_client
            .get(url)
            .query(&[("passing", "true")])
            .send()
            .await
            .map_err(|e| RegistryError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response, "health query").await);
        }

        let entries: Vec<HealthEntry> = response
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;

        Ok(entries.into_iter().map(HealthEntry::into_instance).collect())
    }
}

async fn ensure_success(response: Response, operation: &str) -> Result<(), RegistryError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(status_error(response, operation).await)
    }
}

async fn status_error(response: Response, operation: &str) -> RegistryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    RegistryError::Backend(format!("{operation} returned {status}: {}", body.trim()))
}
