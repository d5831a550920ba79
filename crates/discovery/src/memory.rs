//! In-memory registry for tests and single-process development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::registry::{
    RegistrationId, ServiceInstance, ServiceRegistration, ServiceRegistry,
};
use crate::{DiscoveryError, Result};

#[derive(Debug, Clone)]
struct Entry {
    id: RegistrationId,
    name: String,
    instance: ServiceInstance,
    healthy: bool,
}

#[derive(Debug, Default)]
struct InMemoryRegistryState {
    entries: Vec<Entry>,
    kv: HashMap<String, String>,
    unreachable: bool,
    failures_remaining: u32,
    register_calls: u32,
}

/// In-memory service registry.
///
/// Health is toggled explicitly with [`InMemoryRegistry::set_healthy`]
/// instead of being probed.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    state: Arc<RwLock<InMemoryRegistryState>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a healthy instance directly, bypassing `register`.
    pub async fn add_instance(&self, name: &str, address: &str, port: u16) -> RegistrationId {
        let reg = ServiceRegistration::new(name, address, port);
        let mut state = self.state.write().await;
        state.entries.push(Entry {
            id: reg.id.clone(),
            name: reg.name,
            instance: ServiceInstance::new(address, port),
            healthy: true,
        });
        reg.id
    }

    /// Marks an instance's health check as passing or failing.
    pub async fn set_healthy(&self, id: &RegistrationId, healthy: bool) {
        let mut state = self.state.write().await;
        for entry in state.entries.iter_mut().filter(|e| &e.id == id) {
            entry.healthy = healthy;
        }
    }

    /// Makes every call fail as if the registry were down.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.write().await.unreachable = unreachable;
    }

    /// Makes the next `n` register calls fail.
    pub async fn fail_next_registrations(&self, n: u32) {
        self.state.write().await.failures_remaining = n;
    }

    pub async fn register_calls(&self) -> u32 {
        self.state.read().await.register_calls
    }

    pub async fn is_registered(&self, id: &RegistrationId) -> bool {
        self.state.read().await.entries.iter().any(|e| &e.id == id)
    }

    pub async fn get_key(&self, key: &str) -> Option<String> {
        self.state.read().await.kv.get(key).cloned()
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryRegistry {
    async fn register(&self, registration: &ServiceRegistration) -> Result<RegistrationId> {
        let mut state = self.state.write().await;
        state.register_calls += 1;

        if state.unreachable {
            return Err(DiscoveryError::RegistryUnreachable(
                "registry is down".to_string(),
            ));
        }
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(DiscoveryError::RegistryUnreachable(
                "connection refused".to_string(),
            ));
        }

        state.entries.retain(|e| e.id != registration.id);
        state.entries.push(Entry {
            id: registration.id.clone(),
            name: registration.name.clone(),
            instance: ServiceInstance::new(registration.address.clone(), registration.port),
            healthy: true,
        });
        Ok(registration.id.clone())
    }

    async fn deregister(&self, id: &RegistrationId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.unreachable {
            return Err(DiscoveryError::RegistryUnreachable(
                "registry is down".to_string(),
            ));
        }
        state.entries.retain(|e| &e.id != id);
        Ok(())
    }

    async fn healthy_instances(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        let state = self.state.read().await;
        if state.unreachable {
            return Err(DiscoveryError::RegistryUnreachable(
                "registry is down".to_string(),
            ));
        }
        Ok(state
            .entries
            .iter()
            .filter(|e| e.name == name && e.healthy)
            .map(|e| e.instance.clone())
            .collect())
    }

    async fn put_key(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.unreachable {
            return Err(DiscoveryError::RegistryUnreachable(
                "registry is down".to_string(),
            ));
        }
        state.kv.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
