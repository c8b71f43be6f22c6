//! Single-flight credential refresh
//!
//! Every caller that sees a 401 goes through [`TokenRefreshCoordinator`].
//! The first one starts a refresh; everyone arriving while it is pending
//! joins the same attempt and receives the same outcome.
//!
//! ```text
//!  caller A ──401──┐
//!  caller B ──401──┼──► slot empty? ──yes──► spawn refresh task ──► clear slot ──► outcome
//!  caller C ──401──┘          │                                                     │
//!                             └──no──► clone in-flight attempt ◄────────────────────┘
//! ```
//!
//! The refresh runs on its own task, so a caller that abandons its request
//! never leaves a half-polled attempt behind in the slot.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::response::into_http_error;
use crate::metrics;
use crate::utils::cookie_pair;
use crate::utils::error::FetchError;

/// Result of a successful refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// New `name=value` credential pair, when the refresh response set one
    pub cookie: Option<String>,
}

/// Performs the actual refresh call
#[async_trait]
pub trait Refresher: Send + Sync + 'static {
    /// Exchange the current session for a fresh one
    ///
    /// `cookie` is the caller's forwarded `Cookie` header, if any.
    async fn refresh(&self, cookie: Option<String>) -> Result<RefreshOutcome, FetchError>;
}

/// Refresher that POSTs to the session refresh endpoint
pub struct HttpRefresher {
    http_client: Client,
    endpoint: String,
}

impl HttpRefresher {
    pub fn new(http_client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Refresher for HttpRefresher {
    async fn refresh(&self, cookie: Option<String>) -> Result<RefreshOutcome, FetchError> {
        let mut request = self.http_client.post(&self.endpoint);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(FetchError::from)?;
        metrics::record_response(response.status().as_u16());

        if !response.status().is_success() {
            return Err(into_http_error(response).await);
        }

        let cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(cookie_pair);

        Ok(RefreshOutcome { cookie })
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<RefreshOutcome, FetchError>>>;

/// The one in-flight attempt, if any
struct InFlight {
    id: u64,
    attempt: SharedRefresh,
}

type Slot = Arc<Mutex<Option<InFlight>>>;

/// Clears the slot when the refresh task finishes, even if the refresher panics
struct SlotGuard {
    slot: Slot,
    id: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|in_flight| in_flight.id == self.id) {
            *slot = None;
        }
    }
}

/// Guarantees at most one in-flight credential refresh at a time
pub struct TokenRefreshCoordinator {
    refresher: Arc<dyn Refresher>,
    slot: Slot,
    attempts: AtomicU64,
}

impl TokenRefreshCoordinator {
    pub fn new(refresher: Arc<dyn Refresher>) -> Self {
        Self {
            refresher,
            slot: Arc::new(Mutex::new(None)),
            attempts: AtomicU64::new(0),
        }
    }

    /// Join the in-flight refresh, or start one if none is pending
    ///
    /// All callers attached to the same attempt receive the same outcome.
    /// Failures are not remembered: once an attempt finishes, the next call
    /// starts a new one.
    pub async fn get_or_start(&self, cookie: Option<&str>) -> Result<RefreshOutcome, FetchError> {
        let attempt = {
            let mut slot = self.lock_slot();
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!(attempt = in_flight.id, "Joining in-flight credential refresh");
                    in_flight.attempt.clone()
                }
                None => {
                    let id = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    let attempt = self.spawn_attempt(id, cookie.map(str::to_string));
                    *slot = Some(InFlight {
                        id,
                        attempt: attempt.clone(),
                    });
                    attempt
                }
            }
        };

        attempt.await
    }

    /// Number of refresh attempts started so far
    pub fn attempts_started(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Whether a refresh is currently pending
    pub fn is_refreshing(&self) -> bool {
        self.lock_slot().is_some()
    }

    // Must be called with the slot locked so the task cannot clear it early.
    fn spawn_attempt(&self, id: u64, cookie: Option<String>) -> SharedRefresh {
        let refresher = Arc::clone(&self.refresher);
        let guard = SlotGuard {
            slot: Arc::clone(&self.slot),
            id,
        };

        debug!(attempt = id, "Starting credential refresh");
        let task = tokio::spawn(async move {
            metrics::record_refresh_attempt();
            let result = refresher.refresh(cookie).await;

            match &result {
                Ok(_) => info!(attempt = id, "Credential refresh succeeded"),
                Err(e) => {
                    metrics::record_refresh_failure();
                    warn!(attempt = id, error = %e, "Credential refresh failed");
                }
            }

            drop(guard);
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(FetchError::Network(format!(
                    "credential refresh task failed: {e}"
                ))),
            }
        }
        .boxed()
        .shared()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
