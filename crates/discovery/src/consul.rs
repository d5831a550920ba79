//! Consul agent HTTP API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::registry::{
    RegistrationId, ServiceInstance, ServiceRegistration, ServiceRegistry,
};
use crate::{DiscoveryError, Result};

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    address: &'a str,
    port: u16,
    check: AgentServiceCheck,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceCheck {
    #[serde(rename = "HTTP")]
    http: String,
    interval: String,
    timeout: String,
    deregister_critical_service_after: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthServiceEntry {
    service: AgentService,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    address: String,
    port: u16,
}

fn consul_duration(d: Duration) -> String {
    format!("{}s", d.as_secs())
}

/// Registry backed by a Consul agent.
#[derive(Clone)]
pub struct ConsulRegistry {
    client: Client,
    base_url: String,
}

impl ConsulRegistry {
    /// Creates a client for the agent at `address` (`host:port` or a full URL).
    pub fn new(address: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self::with_client(client, address))
    }

    pub fn with_client(client: Client, address: &str) -> Self {
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn registration_body(registration: &ServiceRegistration) -> AgentServiceRegistration<'_> {
        AgentServiceRegistration {
            id: registration.id.as_str(),
            name: &registration.name,
            address: &registration.address,
            port: registration.port,
            check: AgentServiceCheck {
                http: registration.health_check_url(),
                interval: consul_duration(registration.check.interval),
                timeout: consul_duration(registration.check.timeout),
                deregister_critical_service_after: consul_duration(
                    registration.check.deregister_after,
                ),
            },
        }
    }

    async fn expect_success(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DiscoveryError::RegistryUnreachable(format!(
            "{action} returned {status}: {body}"
        )))
    }
}

fn unreachable(e: reqwest::Error) -> DiscoveryError {
    DiscoveryError::RegistryUnreachable(e.to_string())
}

#[async_trait]
impl ServiceRegistry for ConsulRegistry {
    #[tracing::instrument(skip(self, registration), fields(service = %registration.name, id = %registration.id))]
    async fn register(&self, registration: &ServiceRegistration) -> Result<RegistrationId> {
        let response = self
            .client
            .put(format!("{}/v1/agent/service/register", self.base_url))
            .json(&Self::registration_body(registration))
            .send()
            .await
            .map_err(unreachable)?;
        Self::expect_success(response, "service register").await?;
        Ok(registration.id.clone())
    }

    #[tracing::instrument(skip(self))]
    async fn deregister(&self, id: &RegistrationId) -> Result<()> {
        let response = self
            .client
            .put(format!(
                "{}/v1/agent/service/deregister/{}",
                self.base_url,
                id.as_str()
            ))
            .send()
            .await
            .map_err(unreachable)?;
        Self::expect_success(response, "service deregister").await?;
        Ok(())
    }

    async fn healthy_instances(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        let response = self
            .client
            .get(format!("{}/v1/health/service/{}", self.base_url, name))
            .query(&[("passing", "true")])
            .send()
            .await
            .map_err(unreachable)?;
        let response = Self::expect_success(response, "health query").await?;
        let entries: Vec<HealthServiceEntry> = response.json().await.map_err(unreachable)?;

        Ok(entries
            .into_iter()
            .map(|e| ServiceInstance::new(e.service.address, e.service.port))
            .collect())
    }

    async fn put_key(&self, key: &str, value: &str) -> Result<()> {
        let response = self
            .client
            .put(format!("{}/v1/kv/{}", self.base_url, key.trim_start_matches('/')))
            .body(value.to_string())
            .send()
            .await
            .map_err(unreachable)?;
        Self::expect_success(response, "kv put").await?;
        Ok(())
    }
}
