//! Gateway-level error types.

use crate::config::ConfigError;
use portico_kernel::{DefinitionError, GatewayError};
use thiserror::Error;

/// Deployment lifecycle errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeployError {
    #[error("invalid API definition: {0}")]
    Definition(#[from] DefinitionError),

    #[error("context path '{path}' is already served by API '{api}'")]
    ContextPathConflict { path: String, api: String },

    #[error("API '{0}' is not deployed")]
    UnknownApi(String),

    #[error("API '{api}' failed to start: {source}")]
    Start {
        api: String,
        #[source]
        source: GatewayError,
    },
}

/// Errors that abort the `portico` binary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("deployment error: {0}")]
    Deploy(#[from] DeployError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
