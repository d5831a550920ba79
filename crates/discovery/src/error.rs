use thiserror::Error;

/// Errors that can occur when talking to the service registry.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The registry could not be reached or answered with an error.
    #[error("Registry unreachable: {0}")]
    RegistryUnreachable(String),

    /// The registry is reachable but reports no passing instance.
    #[error("Service unavailable: no healthy instance of '{0}'")]
    NoHealthyInstance(String),

    /// Startup registration gave up after the configured number of attempts.
    #[error("Registration of '{service}' failed after {attempts} attempts: {reason}")]
    RegistrationFailed {
        service: String,
        attempts: u32,
        reason: String,
    },

    /// An HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
