//! Authenticated HTTP client with single-flight session refresh
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │           AuthenticatedHttpClient            │
//! │  issue(request)                              │
//! │    ├─ 2xx / 4xx / 5xx ──► typed result       │
//! │    └─ 401 ─┐                                 │
//! │            ▼                                 │
//! │  ┌────────────────────────────────────────┐  │
//! │  │       TokenRefreshCoordinator          │  │
//! │  │  - one in-flight refresh at a time     │  │
//! │  │  - slot cleared on success or failure  │  │
//! │  └────────────────────────────────────────┘  │
//! │            │                                 │
//! │            ▼                                 │
//! │    replay original request once              │
//! │    └─ still 401 ──► AuthExhausted            │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use netmend::http::{ApiRequest, AuthenticatedHttpClient, HttpClientConfig};
//!
//! # async fn run() -> Result<(), netmend::utils::error::FetchError> {
//! let client = AuthenticatedHttpClient::new(HttpClientConfig::new("http://api:8000"))?;
//! let body = client.issue(&ApiRequest::get("/v1/users/me")).await?;
//! println!("{body:?}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod refresh;
pub mod request;
pub mod response;

pub use client::{AuthenticatedHttpClient, CredentialMode, HttpClientConfig};
pub use refresh::{HttpRefresher, RefreshOutcome, Refresher, TokenRefreshCoordinator};
pub use request::ApiRequest;
pub use response::ResponseBody;
