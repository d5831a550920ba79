use std::sync::Arc;

use rand::Rng;

use crate::registry::{ServiceInstance, ServiceRegistry};
use crate::{DiscoveryError, Result};

/// Resolves logical service names to one healthy instance.
///
/// Selection is uniform random among the instances the registry currently
/// reports as passing. There is no weighting, stickiness or circuit
/// breaking; health feedback comes only from the registry's own checks.
#[derive(Clone)]
pub struct ServiceLocator {
    registry: Arc<dyn ServiceRegistry>,
}

impl ServiceLocator {
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn ServiceRegistry> {
        &self.registry
    }

    /// Returns every currently-passing instance of `name`.
    pub async fn healthy(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        self.registry.healthy_instances(name).await
    }

    /// Picks one healthy instance of `name`.
    ///
    /// Registry errors are returned as-is without retrying; an empty
    /// healthy set yields [`DiscoveryError::NoHealthyInstance`].
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, name: &str) -> Result<ServiceInstance> {
        let mut instances = match self.registry.healthy_instances(name).await {
            Ok(instances) => instances,
            Err(e) => {
                metrics::counter!("discovery_resolutions_total", "outcome" => "registry_error")
                    .increment(1);
                tracing::warn!(service = name, error = %e, "Registry lookup failed");
                return Err(e);
            }
        };

        let picked = match instances.len() {
            0 => None,
            1 => instances.pop(),
            n => {
                let idx = rand::rng().random_range(0..n);
                Some(instances.swap_remove(idx))
            }
        };

        match picked {
            Some(instance) => {
                metrics::counter!("discovery_resolutions_total", "outcome" => "resolved")
                    .increment(1);
                tracing::debug!(service = name, instance = %instance, "Resolved service");
                Ok(instance)
            }
            None => {
                metrics::counter!("discovery_resolutions_total", "outcome" => "unavailable")
                    .increment(1);
                Err(DiscoveryError::NoHealthyInstance(name.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::memory::InMemoryRegistry;

    #[tokio::test]
    async fn resolve_with_no_instances_is_unavailable() {
        let locator = ServiceLocator::new(Arc::new(InMemoryRegistry::new()));

        let result = locator.resolve("users").await;

        assert!(matches!(result, Err(DiscoveryError::NoHealthyInstance(ref s)) if s == "users"));
    }

    #[tokio::test]
    async fn resolve_single_instance() {
        let registry = InMemoryRegistry::new();
        registry.add_instance("users", "user-a", 8080).await;
        let locator = ServiceLocator::new(Arc::new(registry));

        let instance = locator.resolve("users").await.unwrap();

        assert_eq!(instance, ServiceInstance::new("user-a", 8080));
    }

    #[tokio::test]
    async fn resolve_never_returns_failing_instance() {
        let registry = InMemoryRegistry::new();
        let sick = registry.add_instance("users", "sick", 80).await;
        registry.add_instance("users", "well-1", 80).await;
        registry.add_instance("users", "well-2", 80).await;
        registry.set_healthy(&sick, false).await;
        let locator = ServiceLocator::new(Arc::new(registry));

        for _ in 0..500 {
            let instance = locator.resolve("users").await.unwrap();
            assert_ne!(instance.address, "sick");
        }
    }

    #[tokio::test]
    async fn resolve_is_roughly_uniform() {
        let registry = InMemoryRegistry::new();
        for name in ["a", "b", "c", "d"] {
            registry.add_instance("products", name, 80).await;
        }
        let locator = ServiceLocator::new(Arc::new(registry));

        let trials = 8000;
        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..trials {
            let instance = locator.resolve("products").await.unwrap();
            *counts.entry(instance.address).or_default() += 1;
        }

        assert_eq!(counts.len(), 4);
        // Expected 2000 each; the bound is many standard deviations wide.
        for (address, count) in counts {
            assert!(
                (1600..=2400).contains(&count),
                "{address} picked {count} times"
            );
        }
    }

    #[tokio::test]
    async fn resolve_surfaces_registry_errors() {
        let registry = InMemoryRegistry::new();
        registry.add_instance("users", "a", 80).await;
        registry.set_unreachable(true).await;
        let locator = ServiceLocator::new(Arc::new(registry));

        let result = locator.resolve("users").await;

        assert!(matches!(result, Err(DiscoveryError::RegistryUnreachable(_))));
    }

    #[tokio::test]
    async fn resolve_other_service_is_isolated() {
        let registry = InMemoryRegistry::new();
        registry.add_instance("users", "a", 80).await;
        let locator = ServiceLocator::new(Arc::new(registry));

        assert!(locator.resolve("products").await.is_err());
    }
}
