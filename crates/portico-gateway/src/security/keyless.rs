//! Open access: accepts every request without credentials.

use portico_kernel::{AuthenticationHandler, AuthenticationPolicy, ExecutionContext};

pub const KEYLESS_SECURITY_TYPE: &str = "KEY_LESS";

/// Sorted last so any credential-based handler gets the first chance.
pub struct KeylessAuthenticationHandler;

impl AuthenticationHandler for KeylessAuthenticationHandler {
    fn name(&self) -> &str {
        "keyless"
    }

    fn security_type(&self) -> &str {
        KEYLESS_SECURITY_TYPE
    }

    fn order(&self) -> i32 {
        1000
    }

    fn can_handle(&self, _ctx: &ExecutionContext) -> bool {
        true
    }

    fn handle(&self, _ctx: &ExecutionContext) -> Vec<AuthenticationPolicy> {
        Vec::new()
    }
}
