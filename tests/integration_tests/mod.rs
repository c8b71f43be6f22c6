//! Integration tests module
//!
//! End-to-end scenarios for netmend, including:
//! - Many concurrent requests hitting an expired session
//! - Registration retry, deregistration and resolution through Consul

pub mod refresh_scenarios;
pub mod registry_lifecycle;
