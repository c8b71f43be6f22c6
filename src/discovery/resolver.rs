//! Healthy-peer resolution with random client-side selection
//!
//! Selection is uniform over the passing instances and uses a ChaCha8 RNG,
//! so a seeded resolver picks the same sequence every run.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::backend::RegistryBackend;
use crate::metrics;
use crate::utils::error::RegistryError;

/// Lower bound (inclusive) of the random instance id suffix
pub const INSTANCE_SUFFIX_MIN: u64 = 10_000_000;

/// Upper bound (exclusive) of the random instance id suffix, 2^48 - 1
pub const INSTANCE_SUFFIX_MAX: u64 = 281_474_976_710_655;

/// Build an instance id of the form `{service_name}-{suffix}`
pub fn generate_instance_id<R: Rng>(service_name: &str, rng: &mut R) -> String {
    let suffix = rng.gen_range(INSTANCE_SUFFIX_MIN..INSTANCE_SUFFIX_MAX);
    format!("{service_name}-{suffix}")
}

/// Resolves a service name to the addresses of its passing instances
pub struct AddressResolver {
    backend: Arc<dyn RegistryBackend>,
    rng: Mutex<ChaCha8Rng>,
}

impl AddressResolver {
    /// Resolver seeded from OS entropy
    pub fn new(backend: Arc<dyn RegistryBackend>) -> Self {
        Self::with_rng(backend, ChaCha8Rng::from_entropy())
    }

    /// Resolver with a deterministic selection sequence
    pub fn with_seed(backend: Arc<dyn RegistryBackend>, seed: u64) -> Self {
        Self::with_rng(backend, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(backend: Arc<dyn RegistryBackend>, rng: ChaCha8Rng) -> Self {
        Self {
            backend,
            rng: Mutex::new(rng),
        }
    }

    /// Every passing instance as `host:port`
    ///
    /// Fails with [`RegistryError::NoHealthyInstance`] when none pass.
    pub async fn resolve_all(&self, service_name: &str) -> Result<Vec<String>, RegistryError> {
        let instances = match self.backend.healthy_instances(service_name).await {
            Ok(instances) => instances,
            Err(e) => {
                metrics::record_resolution(service_name, "error");
                return Err(e);
            }
        };

        if instances.is_empty() {
            metrics::record_resolution(service_name, "empty");
            return Err(RegistryError::NoHealthyInstance(service_name.to_string()));
        }

        metrics::record_resolution(service_name, "found");
        debug!(
            service = service_name,
            count = instances.len(),
            "Resolved healthy instances"
        );
        Ok(instances.iter().map(|i| i.address()).collect())
    }

    /// One passing instance, chosen uniformly at random
    pub async fn resolve_one(&self, service_name: &str) -> Result<String, RegistryError> {
        let addresses = self.resolve_all(service_name).await?;
        self.choose(&addresses)
            .cloned()
            .ok_or_else(|| RegistryError::NoHealthyInstance(service_name.to_string()))
    }

    /// Uniform pick from a candidate list
    pub fn choose<'a>(&self, addresses: &'a [String]) -> Option<&'a String> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        addresses.choose(&mut *rng)
    }
}
