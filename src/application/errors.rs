//! Application layer errors

use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Audit log error: {0}")]
    Audit(#[from] AuditError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure attached to a command run, escalated to the owner
#[derive(Error, Debug)]
#[error("Operation: {operation}\nError: {source}")]
pub struct OperationError {
    operation: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl OperationError {
    pub fn new(
        operation: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// Audit log errors
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
