//! netmend - Resilient service-to-service networking
//!
//! Two client-side building blocks for a microservice backend:
//! an HTTP client that survives session expiry, and a service-registry client
//! that announces this process and resolves its peers.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`http`] - Authenticated HTTP client with single-flight session refresh
//! - [`discovery`] - Service registration, deregistration and peer resolution
//! - [`config`] - Configuration loading from environment and TOML
//! - [`error`] - Unified error type and error categories
//! - [`metrics`] - Prometheus counters for both clients
//! - [`utils`] - Retry, URL and cookie helpers
//!
//! # Example
//!
//! ```no_run
//! use netmend::config::Config;
//! use netmend::http::{ApiRequest, AuthenticatedHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let client = AuthenticatedHttpClient::new(config.http)?;
//!     let profile = client.issue(&ApiRequest::get("/v1/users/me")).await?;
//!     println!("{profile:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod http;
pub mod metrics;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::discovery::{
        ConsulBackend, RegistryBackend, RegistryConfig, ServiceRegistryClient,
    };
    pub use crate::error::{Error, ErrorCategory, NetmendErrorTrait, Result};
    pub use crate::http::{ApiRequest, AuthenticatedHttpClient, HttpClientConfig, ResponseBody};
    pub use crate::utils::error::{FetchError, RegistryError};
}
