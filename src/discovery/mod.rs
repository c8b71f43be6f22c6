//! Service discovery
//!
//! Registers this process with a service registry at startup, removes it at
//! shutdown, and resolves peer services to a passing `host:port`.
//!
//! # Usage
//!
//! ```no_run
//! use netmend::discovery::{ConsulBackend, RegistryConfig, ServiceRegistryClient};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = RegistryConfig::builder()
//!     .backend("consul", 8500)
//!     .service_name("chat")
//!     .instance("chat", 8003)
//!     .build()?;
//! let backend = Arc::new(ConsulBackend::new(&config)?);
//! let client = ServiceRegistryClient::new(config, backend);
//!
//! client.register().await?;
//! let peer = client.resolve_one("user").await?;
//! println!("user service at {peer}");
//! client.deregister().await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod consul;
pub mod resolver;

pub use backend::{HealthCheck, HealthyInstance, InMemoryRegistry, RegistryBackend, ServiceRegistration};
pub use client::{Deregistration, RegistrationState, ServiceInstance, ServiceRegistryClient};
pub use config::{ConfigError, RegistryConfig, RegistryConfigBuilder};
pub use consul::ConsulBackend;
pub use resolver::{generate_instance_id, AddressResolver};
