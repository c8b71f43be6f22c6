//! Error types for the netmend clients
//!
//! This module defines the error vocabulary shared by the authenticated
//! HTTP client and the service-registry client.

use thiserror::Error;

/// Errors produced at the HTTP client boundary
///
/// Every variant is `Clone` so that one refresh outcome can be handed to
/// all callers waiting on the same refresh attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// No response was obtained (DNS, connection refused, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-2xx status that is not a recoverable 401
    #[error("HTTP error ({status})")]
    Http {
        status: u16,
        body: Option<serde_json::Value>,
    },

    /// Body was malformed or did not match the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// 401 persisted through refresh and replay, or the refresh itself failed
    #[error("Authentication exhausted: {cause}")]
    AuthExhausted { cause: Box<FetchError> },

    /// Caller abandoned the request before it completed
    #[error("Request cancelled")]
    Cancelled,

    /// Request could not be built (bad URL, invalid header value)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Wrap an underlying cause as an exhausted-authentication error
    pub fn auth_exhausted(cause: FetchError) -> Self {
        Self::AuthExhausted {
            cause: Box::new(cause),
        }
    }

    /// Check whether the caller should send the user to re-authenticate
    pub fn is_auth_exhausted(&self) -> bool {
        matches!(self, Self::AuthExhausted { .. })
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::AuthExhausted { cause } => cause.status(),
            _ => None,
        }
    }

    /// Check if this is a 4xx response
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Http { status, .. } if (400..500).contains(status))
    }

    /// Check if this is a 5xx response
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Http { status, .. } if *status >= 500)
    }

    /// Check if retrying the same call later could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Parse(_) | Self::AuthExhausted { .. } | Self::InvalidRequest(_) => false,
            Self::Cancelled => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors produced by the service-registry client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Registration retries were exhausted
    #[error("Registry unavailable after {attempts} attempts: {last_error}")]
    RegistryUnavailable { attempts: u32, last_error: String },

    /// Resolution found zero passing instances
    #[error("No healthy instance of service '{0}'")]
    NoHealthyInstance(String),

    /// Registration was requested while one is in progress or complete
    #[error("Instance already registered: {0}")]
    AlreadyRegistered(String),

    /// Single backend call failed (transport or non-2xx)
    #[error("Registry backend error: {0}")]
    Backend(String),

    /// Backend answered with a body we could not decode
    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),
}

impl RegistryError {
    /// Check if retrying the same call later could succeed
    ///
    /// `RegistryUnavailable` already spent the retry budget and is fatal to
    /// startup.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::NoHealthyInstance(_))
    }
}
