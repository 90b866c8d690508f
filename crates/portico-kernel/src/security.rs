//! Authentication handler contract.

use crate::context::ExecutionContext;
use crate::policy::Policy;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// One step of an authentication chain.
#[derive(Clone)]
pub enum AuthenticationPolicy {
    /// In-process policy instance.
    Direct(Arc<dyn Policy>),
    /// Policy plugin looked up by id and built with `configuration`.
    Plugin { policy: String, configuration: Value },
}

impl fmt::Debug for AuthenticationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthenticationPolicy::Direct(policy) => {
                f.debug_tuple("Direct").field(&policy.id()).finish()
            }
            AuthenticationPolicy::Plugin {
                policy,
                configuration,
            } => f
                .debug_struct("Plugin")
                .field("policy", policy)
                .field("configuration", configuration)
                .finish(),
        }
    }
}

/// Authentication scheme (API key, JWT, keyless, ...).
pub trait AuthenticationHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Plan security type this handler authenticates (e.g. `API_KEY`).
    fn security_type(&self) -> &str;

    /// Lower runs first.
    fn order(&self) -> i32;

    /// Whether the request carries credentials for this scheme.
    fn can_handle(&self, ctx: &ExecutionContext) -> bool;

    /// Ordered authentication policies to run for the request.
    fn handle(&self, ctx: &ExecutionContext) -> Vec<AuthenticationPolicy>;
}
