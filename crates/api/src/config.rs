//! Service configuration loaded from environment variables.

use std::time::Duration;

use discovery::ServiceRegistration;
use orders::{CheckoutConfig, JoinStrategy, StripeConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration shared by both services, with defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `SERVICE_NAME`: logical name in the registry
/// - `SERVICE_HOST`: advertised address (default `HOSTNAME`, then `localhost`)
/// - `SERVICE_ENDPOINT_PREFIX`: public path prefix published to the registry KV
/// - `CONSUL_HTTP_ADDRESS`: registry address (default `http://localhost:8500`)
/// - `DATABASE_URL`: PostgreSQL; in-memory stores when unset
/// - `KAFKA_BROKERS`: Kafka bootstrap servers; in-memory bus when unset
/// - `STRIPE_API_KEY`, `STRIPE_API_BASE`, `STRIPE_WEBHOOK_SECRET`
/// - `CHECKOUT_SUCCESS_URL`, `CHECKOUT_CANCEL_URL`, `CHECKOUT_CURRENCY` (default `inr`)
/// - `PEER_TIMEOUT_SECS` (default 50), `CHECKOUT_JOIN` (`multiplexed` | `sequential`)
/// - `INVENTORY_DEDUP` (default `true`)
/// - `RUST_LOG` (default `info`), `LOG_FORMAT` (`text` | `json`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub service_name: String,
    pub service_host: String,
    pub endpoint_prefix: Option<String>,
    pub consul_address: String,
    pub database_url: Option<String>,
    pub kafka_brokers: Option<String>,
    pub stripe: StripeConfig,
    pub stripe_webhook_secret: Option<String>,
    pub peer_timeout: Duration,
    pub checkout_join: JoinStrategy,
    pub inventory_dedup: bool,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env(default_service_name: &str) -> Self {
        Self::from_lookup(default_service_name, |key| std::env::var(key).ok())
    }

    /// Loads configuration from `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(default_service_name: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::defaults(default_service_name);
        let stripe_defaults = StripeConfig::default();

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            service_name: non_empty("SERVICE_NAME").unwrap_or(defaults.service_name),
            service_host: non_empty("SERVICE_HOST")
                .or_else(|| non_empty("HOSTNAME"))
                .unwrap_or(defaults.service_host),
            endpoint_prefix: non_empty("SERVICE_ENDPOINT_PREFIX"),
            consul_address: non_empty("CONSUL_HTTP_ADDRESS").unwrap_or(defaults.consul_address),
            database_url: non_empty("DATABASE_URL"),
            kafka_brokers: non_empty("KAFKA_BROKERS"),
            stripe: StripeConfig {
                api_key: non_empty("STRIPE_API_KEY").unwrap_or(stripe_defaults.api_key),
                api_base: non_empty("STRIPE_API_BASE").unwrap_or(stripe_defaults.api_base),
                currency: non_empty("CHECKOUT_CURRENCY").unwrap_or(stripe_defaults.currency),
                success_url: non_empty("CHECKOUT_SUCCESS_URL")
                    .unwrap_or(stripe_defaults.success_url),
                cancel_url: non_empty("CHECKOUT_CANCEL_URL").unwrap_or(stripe_defaults.cancel_url),
            },
            stripe_webhook_secret: non_empty("STRIPE_WEBHOOK_SECRET"),
            peer_timeout: non_empty("PEER_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.peer_timeout),
            checkout_join: non_empty("CHECKOUT_JOIN")
                .and_then(|s| JoinStrategy::parse(&s))
                .unwrap_or(defaults.checkout_join),
            inventory_dedup: non_empty("INVENTORY_DEDUP")
                .and_then(|s| parse_bool(&s))
                .unwrap_or(defaults.inventory_dedup),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }

    fn defaults(service_name: &str) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            service_name: service_name.to_string(),
            service_host: "localhost".to_string(),
            endpoint_prefix: None,
            consul_address: "http://localhost:8500".to_string(),
            database_url: None,
            kafka_brokers: None,
            stripe: StripeConfig::default(),
            stripe_webhook_secret: None,
            peer_timeout: Duration::from_secs(50),
            checkout_join: JoinStrategy::default(),
            inventory_dedup: true,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// This process's registry record, probed on `/ping`.
    pub fn registration(&self) -> ServiceRegistration {
        ServiceRegistration::new(&self.service_name, &self.service_host, self.port)
    }

    pub fn checkout(&self) -> CheckoutConfig {
        CheckoutConfig {
            peer_timeout: self.peer_timeout,
            join: self.checkout_join,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
