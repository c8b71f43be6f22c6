//! Configuration management for netmend
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use url::Url;

use crate::discovery::RegistryConfig;
use crate::http::{CredentialMode, HttpClientConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Authenticated HTTP client configuration
    #[serde(default)]
    pub http: HttpClientConfig,

    /// Service registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// Levels accepted by `logging.level`
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl LoggingConfig {
    /// `EnvFilter` directive for this configuration
    ///
    /// The crate logs at the configured level and everything else at `warn`.
    /// `verbose` raises the crate to `debug` and other crates to `info`.
    pub fn filter_directive(&self, verbose: bool) -> String {
        if verbose {
            return String::from("netmend=debug,info");
        }
        format!("netmend={},warn", self.level.trim().to_ascii_lowercase())
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables fall back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let credential_mode = match std::env::var("NETMEND_CREDENTIAL_MODE") {
            Ok(mode) => parse_credential_mode(&mode)?,
            Err(_) => defaults.http.credential_mode,
        };

        let http = HttpClientConfig {
            api_base_url: std::env::var("NETMEND_API_URL")
                .unwrap_or(defaults.http.api_base_url),
            refresh_path: std::env::var("NETMEND_REFRESH_PATH")
                .unwrap_or(defaults.http.refresh_path),
            credential_mode,
            request_timeout_secs: env_or("NETMEND_REQUEST_TIMEOUT", defaults.http.request_timeout_secs),
        };

        let registry_defaults = defaults.registry;
        let hostname =
            std::env::var("NETMEND_HOSTNAME").unwrap_or(registry_defaults.hostname);
        let port = env_or("NETMEND_PORT", registry_defaults.port);
        let health_check_url = std::env::var("NETMEND_HEALTH_CHECK_URL")
            .unwrap_or_else(|_| format!("http://{hostname}:{port}/v1/health"));

        let registry = RegistryConfig {
            backend_host: std::env::var("CONSUL_HOST").unwrap_or(registry_defaults.backend_host),
            backend_port: env_or("CONSUL_PORT", registry_defaults.backend_port),
            service_name: std::env::var("NETMEND_SERVICE_NAME")
                .unwrap_or(registry_defaults.service_name),
            hostname,
            port,
            health_check_url,
            tags: std::env::var("NETMEND_SERVICE_TAGS")
                .map(|tags| parse_tags(&tags))
                .unwrap_or(registry_defaults.tags),
            backend_timeout_secs: env_or(
                "NETMEND_REGISTRY_TIMEOUT",
                registry_defaults.backend_timeout_secs,
            ),
            ..registry_defaults
        };

        let logging = LoggingConfig {
            level: std::env::var("NETMEND_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: std::env::var("NETMEND_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            http,
            registry,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.http.api_base_url)
            .with_context(|| format!("api_base_url is not a valid URL: {}", self.http.api_base_url))?;

        if !self.http.refresh_path.starts_with('/') && Url::parse(&self.http.refresh_path).is_err() {
            anyhow::bail!("refresh_path must be an absolute path or URL");
        }

        if self.http.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        self.registry
            .validate()
            .map_err(|e| anyhow::anyhow!("registry: {e}"))?;

        if !LOG_LEVELS.contains(&self.logging.level.trim().to_ascii_lowercase().as_str()) {
            anyhow::bail!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            );
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Comma-separated tag list; blank entries are dropped
fn parse_tags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

fn parse_credential_mode(value: &str) -> Result<CredentialMode> {
    match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "cookie_jar" => Ok(CredentialMode::CookieJar),
        "forwarded_header" => Ok(CredentialMode::ForwardedHeader),
        other => anyhow::bail!("unknown credential mode: {other}"),
    }
}
