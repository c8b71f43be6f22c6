//! Registry backend abstraction
//!
//! The registry client talks to the backend only through [`RegistryBackend`],
//! so the production Consul agent and the in-memory registry used by tests
//! and local runs are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::utils::error::RegistryError;

// ============================================================================
// Wire Types
// ============================================================================

/// HTTP health check the registry runs against an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    #[serde(rename = "HTTP")]
    pub http: String,
    pub interval: String,
    pub timeout: String,
}

impl HealthCheck {
    pub fn http(url: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            http: url.into(),
            interval: format_duration(interval),
            timeout: format_duration(timeout),
        }
    }
}

/// Registration payload for one service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub check: HealthCheck,
}

/// An instance currently passing its health check
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HealthyInstance {
    pub host: String,
    pub port: u16,
}

impl HealthyInstance {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form handed to callers
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Render a duration the way the registry expects it (`15s`, `500ms`)
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

// ============================================================================
// Backend Trait
// ============================================================================

/// Operations the registry client needs from a service registry
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Announce an instance together with its health check
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), RegistryError>;

    /// Remove an instance by id
    async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError>;

    /// Instances of `service_name` whose health check is passing
    async fn healthy_instances(
        &self,
        service_name: &str,
    ) -> Result<Vec<HealthyInstance>, RegistryError>;
}

// ============================================================================
// In-Memory Registry
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    services: HashMap<String, ServiceRegistration>,
    unhealthy: Vec<String>,
    failing_registrations: u32,
    fail_deregistration: bool,
    register_calls: u32,
    deregister_calls: u32,
}

/// Registry kept in process memory
///
/// Every registered instance counts as passing unless marked unhealthy.
/// Failures can be injected to exercise the client's retry and
/// best-effort paths.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: Mutex<MemoryState>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance directly, bypassing the client
    pub fn seed(&self, id: impl Into<String>, name: impl Into<String>, host: &str, port: u16) {
        let id = id.into();
        let registration = ServiceRegistration {
            id: id.clone(),
            name: name.into(),
            address: host.to_string(),
            port,
            tags: Vec::new(),
            check: HealthCheck::http(
                format!("http://{host}:{port}/v1/health"),
                Duration::from_secs(15),
                Duration::from_secs(2),
            ),
        };
        self.lock().services.insert(id, registration);
    }

    /// Fail the next `count` registration calls
    pub fn fail_next_registrations(&self, count: u32) {
        self.lock().failing_registrations = count;
    }

    /// Make every deregistration call fail
    pub fn fail_deregistrations(&self, fail: bool) {
        self.lock().fail_deregistration = fail;
    }

    /// Exclude an instance from health queries
    pub fn mark_unhealthy(&self, id: impl Into<String>) {
        self.lock().unhealthy.push(id.into());
    }

    pub fn register_calls(&self) -> u32 {
        self.lock().register_calls
    }

    pub fn deregister_calls(&self) -> u32 {
        self.lock().deregister_calls
    }

    /// Registration stored under `id`, if any
    pub fn registration(&self, id: &str) -> Option<ServiceRegistration> {
        self.lock().services.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RegistryBackend for InMemoryRegistry {
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), RegistryError> {
        let mut state = self.lock();
        state.register_calls += 1;

        if state.failing_registrations > 0 {
            state.failing_registrations -= 1;
            return Err(RegistryError::Backend("registry unreachable".to_string()));
        }

        state
            .services
            .insert(registration.id.clone(), registration.clone());
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError> {
        let mut state = self.lock();
        state.deregister_calls += 1;

        if state.fail_deregistration {
            return Err(RegistryError::Backend("registry unreachable".to_string()));
        }

        state.services.remove(instance_id);
        Ok(())
    }

    async fn healthy_instances(
        &self,
        service_name: &str,
    ) -> Result<Vec<HealthyInstance>, RegistryError> {
        let state = self.lock();
        let mut instances: Vec<_> = state
            .services
            .values()
            .filter(|r| r.name == service_name && !state.unhealthy.contains(&r.id))
            .map(|r| HealthyInstance::new(r.address.clone(), r.port))
            .collect();
        instances.sort_by(|a, b| a.address().cmp(&b.address()));
        Ok(instances)
    }
}
