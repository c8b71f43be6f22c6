//! Registry client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::utils::retry::RetryPolicy;

/// Configuration consumed by the service-registry client
///
/// One value object carries everything the client needs: where the registry
/// backend lives and what this instance announces about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry backend host
    pub backend_host: String,

    /// Registry backend port
    pub backend_port: u16,

    /// Logical service name this instance registers under
    pub service_name: String,

    /// Hostname peers use to reach this instance
    pub hostname: String,

    /// Port peers use to reach this instance
    pub port: u16,

    /// URL the registry checks to decide whether this instance is passing
    pub health_check_url: String,

    /// Tags announced with the registration
    #[serde(default)]
    pub tags: Vec<String>,

    /// Health check interval in seconds
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Health check timeout in seconds
    #[serde(default = "default_check_timeout_secs")]
    pub check_timeout_secs: u64,

    /// Total registration attempts before giving up
    #[serde(default = "default_registration_attempts")]
    pub registration_attempts: u32,

    /// Delay between registration attempts in seconds
    #[serde(default = "default_registration_delay_secs")]
    pub registration_delay_secs: u64,

    /// Timeout for each backend call in seconds
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,
}

fn default_check_interval_secs() -> u64 {
    15
}

fn default_check_timeout_secs() -> u64 {
    2
}

fn default_registration_attempts() -> u32 {
    5
}

fn default_registration_delay_secs() -> u64 {
    5
}

fn default_backend_timeout_secs() -> u64 {
    10
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend_host: String::from("localhost"),
            backend_port: 8500,
            service_name: String::from("service"),
            hostname: String::from("localhost"),
            port: 8080,
            health_check_url: String::from("http://localhost:8080/v1/health"),
            tags: Vec::new(),
            check_interval_secs: default_check_interval_secs(),
            check_timeout_secs: default_check_timeout_secs(),
            registration_attempts: default_registration_attempts(),
            registration_delay_secs: default_registration_delay_secs(),
            backend_timeout_secs: default_backend_timeout_secs(),
        }
    }
}

impl RegistryConfig {
    /// Create a new config builder
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "service_name".to_string(),
            });
        }

        if self.backend_host.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "backend_host".to_string(),
            });
        }

        if self.hostname.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "hostname".to_string(),
            });
        }

        if self.backend_port == 0 || self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                reason: "Ports must be non-zero".to_string(),
            });
        }

        if Url::parse(&self.health_check_url).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "health_check_url".to_string(),
                reason: format!("Invalid URL: {}", self.health_check_url),
            });
        }

        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "tags".to_string(),
                reason: "Tags must not be blank".to_string(),
            });
        }

        if self.registration_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "registration_attempts".to_string(),
                reason: "Must allow at least 1 attempt".to_string(),
            });
        }

        if self.check_timeout_secs >= self.check_interval_secs {
            return Err(ConfigError::InvalidValue {
                field: "check_timeout_secs".to_string(),
                reason: "Timeout must be shorter than interval".to_string(),
            });
        }

        Ok(())
    }

    /// Base URL of the registry backend
    pub fn backend_url(&self) -> String {
        format!("http://{}:{}", self.backend_host, self.backend_port)
    }

    /// Retry policy used for registration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.registration_attempts,
            Duration::from_secs(self.registration_delay_secs),
        )
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }
}

/// Builder for RegistryConfig
#[derive(Debug, Default)]
pub struct RegistryConfigBuilder {
    backend_host: Option<String>,
    backend_port: Option<u16>,
    service_name: Option<String>,
    hostname: Option<String>,
    port: Option<u16>,
    health_check_url: Option<String>,
    tags: Vec<String>,
    registration_attempts: Option<u32>,
    registration_delay_secs: Option<u64>,
    backend_timeout_secs: Option<u64>,
}

impl RegistryConfigBuilder {
    /// Set registry backend address
    pub fn backend(mut self, host: impl Into<String>, port: u16) -> Self {
        self.backend_host = Some(host.into());
        self.backend_port = Some(port);
        self
    }

    /// Set service name
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the address this instance announces
    pub fn instance(mut self, hostname: impl Into<String>, port: u16) -> Self {
        self.hostname = Some(hostname.into());
        self.port = Some(port);
        self
    }

    /// Set health check URL
    pub fn health_check_url(mut self, url: impl Into<String>) -> Self {
        self.health_check_url = Some(url.into());
        self
    }

    /// Set the tags announced with the registration
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set registration retry schedule
    pub fn registration_retry(mut self, attempts: u32, delay_secs: u64) -> Self {
        self.registration_attempts = Some(attempts);
        self.registration_delay_secs = Some(delay_secs);
        self
    }

    /// Set backend call timeout
    pub fn backend_timeout_secs(mut self, secs: u64) -> Self {
        self.backend_timeout_secs = Some(secs);
        self
    }

    /// Build the config
    ///
    /// When no health check URL is given, one is derived as
    /// `http://{hostname}:{port}/v1/health`.
    pub fn build(self) -> Result<RegistryConfig, ConfigError> {
        let service_name = self.service_name.ok_or_else(|| ConfigError::MissingField {
            field: "service_name".to_string(),
        })?;
        let defaults = RegistryConfig::default();
        let hostname = self.hostname.unwrap_or(defaults.hostname);
        let port = self.port.unwrap_or(defaults.port);
        let health_check_url = self
            .health_check_url
            .unwrap_or_else(|| format!("http://{hostname}:{port}/v1/health"));

        let config = RegistryConfig {
            backend_host: self.backend_host.unwrap_or(defaults.backend_host),
            backend_port: self.backend_port.unwrap_or(defaults.backend_port),
            service_name,
            hostname,
            port,
            health_check_url,
            tags: self.tags,
            check_interval_secs: defaults.check_interval_secs,
            check_timeout_secs: defaults.check_timeout_secs,
            registration_attempts: self
                .registration_attempts
                .unwrap_or(defaults.registration_attempts),
            registration_delay_secs: self
                .registration_delay_secs
                .unwrap_or(defaults.registration_delay_secs),
            backend_timeout_secs: self
                .backend_timeout_secs
                .unwrap_or(defaults.backend_timeout_secs),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { field: String, reason: String },
    MissingField { field: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            Self::MissingField { field } => {
                write!(f, "Missing required field: {}", field)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
