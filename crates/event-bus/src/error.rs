use thiserror::Error;

/// Errors raised by bus backends.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// The broker reported an error while polling.
    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BusError>;
