//! Prometheus metrics for the HTTP and registry clients
//!
//! This module provides metrics tracking for:
//! - HTTP client: credential refreshes, replays, exhausted sessions
//! - Registry client: registration attempts, deregistrations, resolutions
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, Counter, CounterVec, Encoder, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for HTTP client metrics
struct HttpMetrics {
    refresh_attempts: Counter,
    refresh_failures: Counter,
    replays: Counter,
    auth_exhausted: Counter,
    responses: CounterVec,
}

/// Container for registry client metrics
struct RegistryMetrics {
    registration_attempts: Counter,
    registration_failures: Counter,
    deregistrations: CounterVec,
    resolutions: CounterVec,
}

static HTTP_METRICS: OnceLock<HttpMetrics> = OnceLock::new();

static REGISTRY_METRICS: OnceLock<RegistryMetrics> = OnceLock::new();

static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// Subsequent calls return `Ok(())` without re-registering.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let http = HttpMetrics {
        refresh_attempts: register_counter!(
            "netmend_http_refresh_attempts_total",
            "Credential refresh calls issued"
        )?,
        refresh_failures: register_counter!(
            "netmend_http_refresh_failures_total",
            "Credential refresh calls that failed"
        )?,
        replays: register_counter!(
            "netmend_http_replays_total",
            "Original requests replayed after a refresh"
        )?,
        auth_exhausted: register_counter!(
            "netmend_http_auth_exhausted_total",
            "Requests that ended with an exhausted session"
        )?,
        responses: register_counter_vec!(
            "netmend_http_responses_total",
            "Responses received by status class",
            &["class"]
        )?,
    };

    let registry = RegistryMetrics {
        registration_attempts: register_counter!(
            "netmend_registry_registration_attempts_total",
            "Service registration calls issued"
        )?,
        registration_failures: register_counter!(
            "netmend_registry_registration_failures_total",
            "Service registration calls that failed"
        )?,
        deregistrations: register_counter_vec!(
            "netmend_registry_deregistrations_total",
            "Deregistration calls by outcome",
            &["outcome"]
        )?,
        resolutions: register_counter_vec!(
            "netmend_registry_resolutions_total",
            "Address resolutions by service and outcome",
            &["service", "outcome"]
        )?,
    };

    HTTP_METRICS
        .set(http)
        .map_err(|_| "HTTP metrics already initialized")?;
    REGISTRY_METRICS
        .set(registry)
        .map_err(|_| "Registry metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    HTTP_METRICS.get().is_some() && REGISTRY_METRICS.get().is_some()
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// ============================================================================
// HTTP client
// ============================================================================

pub fn record_refresh_attempt() {
    if let Some(m) = HTTP_METRICS.get() {
        m.refresh_attempts.inc();
    }
}

pub fn record_refresh_failure() {
    if let Some(m) = HTTP_METRICS.get() {
        m.refresh_failures.inc();
    }
}

pub fn record_replay() {
    if let Some(m) = HTTP_METRICS.get() {
        m.replays.inc();
    }
}

pub fn record_auth_exhausted() {
    if let Some(m) = HTTP_METRICS.get() {
        m.auth_exhausted.inc();
    }
}

/// Record a response status, bucketed as `2xx`, `4xx`, ...
pub fn record_response(status: u16) {
    let Some(m) = HTTP_METRICS.get() else {
        return;
    };

    let class = format!("{}xx", status / 100);
    m.responses.with_label_values(&[class.as_str()]).inc();
}

// ============================================================================
// Registry client
// ============================================================================

pub fn record_registration_attempt(success: bool) {
    let Some(m) = REGISTRY_METRICS.get() else {
        return;
    };

    m.registration_attempts.inc();
    if !success {
        m.registration_failures.inc();
    }
}

pub fn record_deregistration(success: bool) {
    if let Some(m) = REGISTRY_METRICS.get() {
        let outcome = if success { "ok" } else { "error" };
        m.deregistrations.with_label_values(&[outcome]).inc();
    }
}

pub fn record_resolution(service: &str, outcome: &str) {
    if let Some(m) = REGISTRY_METRICS.get() {
        m.resolutions.with_label_values(&[service, outcome]).inc();
    }
}

// ============================================================================
// Tests
// ============================================================================
