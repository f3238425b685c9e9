use crate::lifecycle::LifecycleError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrellisError>;

#[derive(Debug, Error)]
pub enum TrellisError {
    #[error("Application started before it was configured")]
    NotConfigured,

    #[error("Global policy '*' is missing; refusing to compile routes")]
    MissingGlobalPolicy,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{kind} '{name}' is not registered")]
    ComponentNotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' is already active")]
    ComponentAlreadyActive { kind: &'static str, name: String },

    #[error("Failed to construct {kind} '{name}': {source}")]
    ComponentInit {
        kind: &'static str,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Unsupported policy type '{found}' in {location}")]
    UnsupportedPolicy { location: String, found: String },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrellisError {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
