//! Service discovery for the checkout services.
//!
//! - [`ServiceRegistry`] wraps registration, health-check declaration and
//!   lookup of currently-passing instances against an external registry.
//! - [`ServiceLocator`] turns a logical service name into one concrete
//!   address, picked uniformly at random among healthy instances.
//! - [`register_with_retry`] performs startup registration with a bounded
//!   number of attempts.

pub mod consul;
pub mod error;
pub mod locator;
pub mod memory;
pub mod registration;
pub mod registry;

pub use consul::ConsulRegistry;
pub use error::{DiscoveryError, Result};
pub use locator::ServiceLocator;
pub use memory::InMemoryRegistry;
pub use registration::{RegisteredService, RetryPolicy, register_with_retry};
pub use registry::{
    HealthCheckPolicy, RegistrationId, ServiceInstance, ServiceRegistration, ServiceRegistry,
};
