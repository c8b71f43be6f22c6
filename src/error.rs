//! Unified error handling for the netmend crate
//!
//! This module provides a unified error type that consolidates the
//! domain-specific errors into a single `Error` enum, while keeping the
//! domain errors available to callers that want to match on them.
//!
//! # Architecture
//!
//! - [`NetmendErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use netmend::error::{Error, ErrorCategory, NetmendErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.category() == ErrorCategory::Auth {
//!         // send the user back to the login flow
//!     } else if err.is_recoverable() {
//!         // try again later
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::utils::error::{FetchError, RegistryError};
pub use crate::utils::retry::RetryExhausted;

/// Common trait for all netmend error types
pub trait NetmendErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// No response, or an unexpected HTTP status
    Network,
    /// Session could not be restored; the user must sign in again
    Auth,
    /// Malformed or unexpected payloads
    Parsing,
    /// Service registration and resolution
    Discovery,
    /// Configuration and validation errors
    Config,
    /// Local I/O and everything else
    Other,
}

impl ErrorCategory {
    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Parsing => "parsing",
            Self::Discovery => "discovery",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl NetmendErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        FetchError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) | Self::Http { .. } | Self::Cancelled => ErrorCategory::Network,
            Self::AuthExhausted { .. } => ErrorCategory::Auth,
            Self::Parse(_) => ErrorCategory::Parsing,
            Self::InvalidRequest(_) => ErrorCategory::Config,
        }
    }
}

impl NetmendErrorTrait for RegistryError {
    fn is_recoverable(&self) -> bool {
        RegistryError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidResponse(_) => ErrorCategory::Parsing,
            _ => ErrorCategory::Discovery,
        }
    }
}

/// Unified error type for the netmend crate
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP client errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Service registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl NetmendErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Registry(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Registry(e) => e.category(),
            Self::Io(_) => ErrorCategory::Other,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<crate::discovery::ConfigError> for Error {
    fn from(err: crate::discovery::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
