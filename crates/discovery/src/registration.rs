//! Startup registration with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use crate::registry::{RegistrationId, ServiceRegistration, ServiceRegistry};
use crate::{DiscoveryError, Result};

/// Retry policy for startup registration.
///
/// Attempt `n` (1-based) that fails is followed by a sleep of
/// `base_delay * n` before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Handle to this process's registry entry. Call
/// [`RegisteredService::deregister`] on graceful shutdown.
pub struct RegisteredService {
    registry: Arc<dyn ServiceRegistry>,
    id: RegistrationId,
}

impl RegisteredService {
    pub fn id(&self) -> &RegistrationId {
        &self.id
    }

    #[tracing::instrument(skip(self), fields(id = %self.id))]
    pub async fn deregister(self) -> Result<()> {
        self.registry.deregister(&self.id).await?;
        tracing::info!("Deregistered from service registry");
        Ok(())
    }
}

/// Registers `registration`, retrying with linear backoff.
///
/// When `prefix_key` is given as `(prefix, service_name)` the mapping is
/// written to the registry's KV store after a successful registration.
/// Exhausting the policy returns [`DiscoveryError::RegistrationFailed`] so
/// the caller can abort startup.
#[tracing::instrument(skip_all, fields(service = %registration.name))]
pub async fn register_with_retry(
    registry: Arc<dyn ServiceRegistry>,
    registration: &ServiceRegistration,
    policy: RetryPolicy,
    prefix_key: Option<(&str, &str)>,
) -> Result<RegisteredService> {
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match registry.register(registration).await {
            Ok(id) => {
                tracing::info!(attempt, id = %id, "Registered with service registry");
                if let Some((key, value)) = prefix_key {
                    registry.put_key(key, value).await?;
                }
                return Ok(RegisteredService { registry, id });
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Service registration failed");
                last_error = Some(e);
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }

    Err(DiscoveryError::RegistrationFailed {
        service: registration.name.clone(),
        attempts: policy.max_attempts,
        reason: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string()),
    })
}
