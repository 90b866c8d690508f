//! Error types for the gateway kernel contract.
//!
//! [`GatewayError`] is the runtime taxonomy every pipeline step reports
//! through: interruptions, structured policy failures, configuration and
//! programming errors, and connector/plugin errors.  [`DefinitionError`]
//! covers problems detected when an [`ApiDefinition`](crate::ApiDefinition)
//! is validated at deploy time, before any runtime resources are allocated.

use crate::phase::ExecutionPhase;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// ExecutionFailure
// ─────────────────────────────────────────────────────────────────────────────

/// Structured failure reported by a policy, processor or connector.
///
/// Carries what the error rendering step needs to produce a response:
/// a status code, an optional error key used to select a response template,
/// a human-readable message, template parameters and a content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub status_code: u16,
    pub key: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    pub content_type: Option<String>,
}

impl ExecutionFailure {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            key: None,
            message: None,
            parameters: HashMap::new(),
            content_type: None,
        }
    }

    /// Builder: set the error key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Builder: set the message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Builder: add a template parameter.
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Builder: set the content type of `message`.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_code)?;
        if let Some(key) = &self.key {
            write!(f, " [{key}]")?;
        }
        if let Some(message) = &self.message {
            write!(f, " {message}")?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayError
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime error type shared by every pipeline component.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// Execution was stopped on purpose and the response is already complete
    /// (e.g. a CORS preflight answered by the gateway itself).
    #[error("execution interrupted")]
    Interrupted,

    /// A policy, processor or connector reported a structured failure.
    #[error("execution failure: {0}")]
    Failure(ExecutionFailure),

    /// An async phase was executed with a context that cannot carry messages.
    #[error("phase '{phase}' requires a message-capable execution context")]
    ContextMismatch { phase: ExecutionPhase },

    /// A legacy (request/response only) policy was requested for a message phase.
    #[error("legacy policy '{policy}' cannot be executed in phase '{phase}'")]
    LegacyPolicyPhase { policy: String, phase: ExecutionPhase },

    /// No manifest is registered under the requested policy id.
    #[error("policy '{0}' is not registered")]
    UnknownPolicy(String),

    /// A guard expression could not be parsed or evaluated.
    #[error("condition evaluation failed: {0}")]
    Condition(String),

    /// A connector failed outside of a structured failure.
    #[error("connector error: {0}")]
    Connector(String),

    /// A plugin factory could not build an instance.
    #[error("plugin error: {0}")]
    Plugin(String),

    /// A per-API component was used after the API was undeployed.
    #[error("API '{0}' is no longer deployed")]
    Undeployed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used across the kernel contracts.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Shorthand for `GatewayError::Failure(failure)`.
    pub fn failure(failure: ExecutionFailure) -> Self {
        GatewayError::Failure(failure)
    }

    /// `true` when execution was interrupted without a failure.
    pub fn is_interruption(&self) -> bool {
        matches!(self, GatewayError::Interrupted)
    }

    /// The structured failure, when this error carries one.
    pub fn execution_failure(&self) -> Option<&ExecutionFailure> {
        match self {
            GatewayError::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Failure to render for this error.
    ///
    /// Structured failures are returned as-is; every other variant becomes a
    /// `500 Internal Server Error` carrying the error text.
    pub fn to_failure(&self) -> ExecutionFailure {
        match self {
            GatewayError::Failure(failure) => failure.clone(),
            GatewayError::Condition(_) => ExecutionFailure::new(500)
                .key("POLICY_CONDITION_EVALUATION_FAILURE")
                .message(self.to_string()),
            other => ExecutionFailure::new(500)
                .key("GATEWAY_INTERNAL_ERROR")
                .message(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DefinitionError
// ─────────────────────────────────────────────────────────────────────────────

/// Deploy-time validation error for an [`ApiDefinition`](crate::ApiDefinition).
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("api id cannot be empty")]
    EmptyApiId,

    #[error("api '{0}' must declare at least one listener")]
    NoListeners(String),

    #[error("api '{api}' declares a {listener} listener without entrypoints")]
    NoEntrypoints { api: String, listener: String },

    #[error("api '{api}' has an entrypoint without a type")]
    EmptyEntrypointType { api: String },

    #[error("context path '{0}' must start with '/'")]
    InvalidContextPath(String),

    #[error("context path '{0}' is declared more than once")]
    DuplicateContextPath(String),

    #[error("plan id cannot be empty")]
    EmptyPlanId,

    #[error("plan '{0}' is declared more than once")]
    DuplicatePlan(String),

    #[error("flow '{0}' has a step without a policy id")]
    EmptyStepPolicy(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_failure_is_kept_as_is() {
        let failure = ExecutionFailure::new(401).key("API_KEY_MISSING").message("Unauthorized");
        let err = GatewayError::failure(failure.clone());
        assert_eq!(err.to_failure(), failure);
        assert_eq!(err.execution_failure(), Some(&failure));
    }

    #[test]
    fn other_errors_render_as_500() {
        let err = GatewayError::Internal("boom".into());
        let failure = err.to_failure();
        assert_eq!(failure.status_code, 500);
        assert_eq!(failure.key.as_deref(), Some("GATEWAY_INTERNAL_ERROR"));
    }

    #[test]
    fn display_includes_key_and_message() {
        let failure = ExecutionFailure::new(404).key("NOT_FOUND").message("missing");
        assert_eq!(failure.to_string(), "404 [NOT_FOUND] missing");
    }
}
