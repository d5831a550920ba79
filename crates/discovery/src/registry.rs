use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// A concrete, reachable service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceInstance {
    pub address: String,
    pub port: u16,
}

impl ServiceInstance {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Returns the `http://address:port` base URL of the instance.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

impl std::fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// How the registry should probe an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckPolicy {
    /// HTTP path probed on the instance.
    pub path: String,
    pub interval: Duration,
    pub timeout: Duration,
    /// The registry drops the instance after failing checks for this long.
    pub deregister_after: Duration,
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            path: "/ping".to_string(),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            deregister_after: Duration::from_secs(30),
        }
    }
}

/// Identifier handed back by the registry for one registered instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistrationId(String);

impl RegistrationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ephemeral registry record describing this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    /// Logical service name peers resolve by.
    pub name: String,
    /// Unique instance id (`name-address`).
    pub id: RegistrationId,
    pub address: String,
    pub port: u16,
    pub check: HealthCheckPolicy,
}

impl ServiceRegistration {
    /// Creates a registration with the default health-check policy.
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        let name = name.into();
        let address = address.into();
        Self {
            id: RegistrationId::new(format!("{name}-{address}")),
            name,
            address,
            port,
            check: HealthCheckPolicy::default(),
        }
    }

    /// Replaces the health-check policy.
    pub fn with_check(mut self, check: HealthCheckPolicy) -> Self {
        self.check = check;
        self
    }

    /// URL the registry probes to decide whether this instance is healthy.
    pub fn health_check_url(&self) -> String {
        format!("http://{}:{}{}", self.address, self.port, self.check.path)
    }
}

/// Client for an external service registry.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Registers an instance together with its health check.
    async fn register(&self, registration: &ServiceRegistration) -> Result<RegistrationId>;

    /// Removes a previously registered instance.
    async fn deregister(&self, id: &RegistrationId) -> Result<()>;

    /// Returns only the instances of `name` whose health check is passing.
    async fn healthy_instances(&self, name: &str) -> Result<Vec<ServiceInstance>>;

    /// Writes a key into the registry's key-value store.
    ///
    /// Used to publish the public path prefix → service name mapping a
    /// gateway routes on.
    async fn put_key(&self, key: &str, value: &str) -> Result<()>;
}
