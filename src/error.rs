use thiserror::Error;

/// Errors produced by the AI gateway and its supporting layers.
#[derive(Error, Debug)]
pub enum LabAssistError {
    /// The request never reached the service, or the service answered with a failure.
    #[error("{0}")]
    Transport(String),

    /// The response could not be parsed into the expected shape, or broke a hard constraint.
    #[error("Invalid AI response: {0}")]
    SchemaViolation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LabAssistError>;
