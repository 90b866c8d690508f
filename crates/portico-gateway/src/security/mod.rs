//! Authentication: handler registry, resolver, built-in handlers and the
//! per-API security chain.

mod api_key;
mod chain;
mod keyless;
mod registry;
mod resolver;

pub use api_key::{API_KEY_SECURITY_TYPE, ApiKeyAuthenticationHandler, ApiKeyLocation, ApiKeyPolicy};
pub use chain::SecurityChain;
pub use keyless::{KEYLESS_SECURITY_TYPE, KeylessAuthenticationHandler};
pub use registry::{
    AuthenticationHandlerEnhancer, AuthenticationHandlerRegistry, HandlerList, PlanSecurityEnhancer,
};
pub use resolver::{SecurityPolicyResolver, SecurityResolution, UnauthorizedPolicy};
