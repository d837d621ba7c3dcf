use thiserror::Error;

#[derive(Error, Debug)]
pub enum RebalancerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Reconciliation failed: {operation}: {message}")]
    Reconciliation { operation: String, message: String },

    #[error("Chain query failed: {0}")]
    Chain(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Settlement service rejected transaction: {0}")]
    Rejected(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl RebalancerError {
    pub fn reconciliation(operation: &str, message: impl Into<String>) -> Self {
        RebalancerError::Reconciliation {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for RebalancerError {
    fn from(e: reqwest::Error) -> Self {
        RebalancerError::HttpError(e.to_string())
    }
}

impl From<serde_json::Error> for RebalancerError {
    fn from(e: serde_json::Error) -> Self {
        RebalancerError::SerializationError(e.to_string())
    }
}
