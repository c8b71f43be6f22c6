//! Service-registry client
//!
//! Owns the registration lifecycle of this process and resolves peers:
//!
//! ```text
//! Unregistered ──register()──► Registering ──ok──► Registered
//!      ▲                            │                  │
//!      └──────── retries exhausted ─┘            deregister()
//!      │                                               ▼
//!      └─────────────────── ok ───────────────── Deregistering
//! ```

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::backend::{HealthCheck, RegistryBackend, ServiceRegistration};
use super::config::RegistryConfig;
use super::resolver::{generate_instance_id, AddressResolver};
use crate::metrics;
use crate::utils::error::RegistryError;
use crate::utils::retry::{with_retry, Clock, RetryPolicy, TokioClock};

// ============================================================================
// Registration State
// ============================================================================

/// Lifecycle state of this process in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Registered,
    Deregistering,
}

impl RegistrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Registering => "registering",
            Self::Registered => "registered",
            Self::Deregistering => "deregistering",
        }
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// This process as announced to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub service_name: String,
    pub instance_id: String,
    pub hostname: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub health_check: HealthCheck,
}

impl ServiceInstance {
    fn to_registration(&self) -> ServiceRegistration {
        ServiceRegistration {
            id: self.instance_id.clone(),
            name: self.service_name.clone(),
            address: self.hostname.clone(),
            port: self.port,
            tags: self.tags.clone(),
            check: self.health_check.clone(),
        }
    }
}

/// Result of a deregistration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deregistration {
    /// Nothing was registered
    Skipped,
    /// The backend removed the instance
    Completed,
    /// The backend call failed; the instance stays registered
    Failed(String),
}

#[derive(Debug)]
struct Lifecycle {
    state: RegistrationState,
    instance: Option<ServiceInstance>,
}

// ============================================================================
// Registry Client
// ============================================================================

/// Client for registering this process and resolving its peers
pub struct ServiceRegistryClient {
    config: RegistryConfig,
    backend: Arc<dyn RegistryBackend>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
    resolver: AddressResolver,
    lifecycle: RwLock<Lifecycle>,
    id_rng: Mutex<ChaCha8Rng>,
}

impl ServiceRegistryClient {
    /// Create a client using the real timer and OS entropy
    pub fn new(config: RegistryConfig, backend: Arc<dyn RegistryBackend>) -> Self {
        Self {
            retry_policy: config.retry_policy(),
            resolver: AddressResolver::new(Arc::clone(&backend)),
            clock: Arc::new(TokioClock),
            lifecycle: RwLock::new(Lifecycle {
                state: RegistrationState::Unregistered,
                instance: None,
            }),
            id_rng: Mutex::new(ChaCha8Rng::from_entropy()),
            config,
            backend,
        }
    }

    /// Replace the clock used between registration attempts
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the registration retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Make instance ids and peer selection deterministic
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.id_rng = Mutex::new(ChaCha8Rng::seed_from_u64(seed));
        self.resolver = AddressResolver::with_seed(Arc::clone(&self.backend), seed);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Current lifecycle state
    pub async fn state(&self) -> RegistrationState {
        self.lifecycle.read().await.state
    }

    /// The registered (or registering) instance, if any
    pub async fn instance(&self) -> Option<ServiceInstance> {
        self.lifecycle.read().await.instance.clone()
    }

    /// Register this process, retrying per the retry policy
    ///
    /// Attempts are serial with the policy delay between them. When every
    /// attempt fails the state returns to `Unregistered` and the error
    /// reports the attempt count and the last backend failure.
    pub async fn register(&self) -> Result<ServiceInstance, RegistryError> {
        let instance = {
            let mut lifecycle = self.lifecycle.write().await;
            if lifecycle.state != RegistrationState::Unregistered {
                let id = lifecycle
                    .instance
                    .as_ref()
                    .map(|i| i.instance_id.clone())
                    .unwrap_or_else(|| self.config.service_name.clone());
                return Err(RegistryError::AlreadyRegistered(id));
            }

            let instance = self.new_instance();
            lifecycle.state = RegistrationState::Registering;
            lifecycle.instance = Some(instance.clone());
            instance
        };

        info!(
            service = %instance.service_name,
            instance_id = %instance.instance_id,
            address = %format!("{}:{}", instance.hostname, instance.port),
            "Registering service instance"
        );

        let registration = instance.to_registration();
        let backend = &self.backend;
        let registration = &registration;
        let result = with_retry(&self.retry_policy, self.clock.as_ref(), move || async move {
            let result = backend.register(registration).await;
            metrics::record_registration_attempt(result.is_ok());
            result
        })
        .await;

        let mut lifecycle = self.lifecycle.write().await;
        match result {
            Ok(()) => {
                lifecycle.state = RegistrationState::Registered;
                info!(instance_id = %instance.instance_id, "Service instance registered");
                Ok(instance)
            }
            Err(exhausted) => {
                lifecycle.state = RegistrationState::Unregistered;
                lifecycle.instance = None;
                error!(
                    instance_id = %instance.instance_id,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Service registration failed"
                );
                Err(RegistryError::RegistryUnavailable {
                    attempts: exhausted.attempts,
                    last_error: exhausted.last_error.to_string(),
                })
            }
        }
    }

    /// Remove this process from the registry
    ///
    /// Best-effort: failures are logged and reported in the returned value,
    /// never raised. Calling it when nothing is registered does nothing.
    pub async fn deregister(&self) -> Deregistration {
        let instance_id = {
            let mut lifecycle = self.lifecycle.write().await;
            if lifecycle.state != RegistrationState::Registered {
                return Deregistration::Skipped;
            }
            lifecycle.state = RegistrationState::Deregistering;
            match lifecycle.instance.as_ref() {
                Some(instance) => instance.instance_id.clone(),
                None => {
                    lifecycle.state = RegistrationState::Unregistered;
                    return Deregistration::Skipped;
                }
            }
        };

        let result = self.backend.deregister(&instance_id).await;
        metrics::record_deregistration(result.is_ok());

        let mut lifecycle = self.lifecycle.write().await;
        match result {
            Ok(()) => {
                lifecycle.state = RegistrationState::Unregistered;
                lifecycle.instance = None;
                info!(instance_id = %instance_id, "Service instance deregistered");
                Deregistration::Completed
            }
            Err(e) => {
                lifecycle.state = RegistrationState::Registered;
                warn!(instance_id = %instance_id, error = %e, "Service deregistration failed");
                Deregistration::Failed(e.to_string())
            }
        }
    }

    /// Addresses of every passing instance of `service_name`
    pub async fn resolve_addresses(&self, service_name: &str) -> Result<Vec<String>, RegistryError> {
        self.resolver.resolve_all(service_name).await
    }

    /// One passing instance of `service_name`, picked uniformly at random
    pub async fn resolve_one(&self, service_name: &str) -> Result<String, RegistryError> {
        self.resolver.resolve_one(service_name).await
    }

    fn new_instance(&self) -> ServiceInstance {
        let instance_id = {
            let mut rng = self.id_rng.lock().unwrap_or_else(PoisonError::into_inner);
            generate_instance_id(&self.config.service_name, &mut *rng)
        };

        ServiceInstance {
            service_name: self.config.service_name.clone(),
            instance_id,
            hostname: self.config.hostname.clone(),
            port: self.config.port,
            tags: self.config.tags.clone(),
            health_check: HealthCheck::http(
                self.config.health_check_url.clone(),
                self.config.check_interval(),
                self.config.check_timeout(),
            ),
        }
    }
}
