//! Logical request issued through the authenticated client

use reqwest::Method;
use serde::Serialize;

use crate::utils::error::FetchError;

/// A request as the calling layer describes it
///
/// The value is kept intact so the client can replay it verbatim after a
/// credential refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,

    /// Path relative to the API base URL, or an absolute URL
    pub target: String,

    /// Extra headers, applied in order
    pub headers: Vec<(String, String)>,

    /// JSON body, if any
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Create a request with no headers and no body
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    pub fn put(target: impl Into<String>) -> Self {
        Self::new(Method::PUT, target)
    }

    pub fn patch(target: impl Into<String>) -> Self {
        Self::new(Method::PATCH, target)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(Method::DELETE, target)
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Forward a caller's session cookie (server-to-server mode)
    pub fn with_cookie(self, cookie: impl Into<String>) -> Self {
        self.with_header("Cookie", cookie)
    }

    /// Set a JSON body from any serializable value
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, FetchError> {
        let value =
            serde_json::to_value(body).map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Set a JSON body
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Last value set for header `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Cookie header forwarded by the caller, if any
    pub fn cookie(&self) -> Option<&str> {
        self.header("cookie")
    }

    /// Whether this method carries a body by convention
    ///
    /// Such requests are sent as JSON even when the body is empty.
    pub fn expects_body(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD)
    }
}
