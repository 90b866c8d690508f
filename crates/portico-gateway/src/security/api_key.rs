//! API-key authentication.
//!
//! A key is read from the configured header first (default
//! `X-Gravitee-Api-Key`), then from the configured query parameter
//! (default `api-key`).

use async_trait::async_trait;
use portico_kernel::context::ATTR_API_KEY;
use portico_kernel::{
    AuthenticationHandler, AuthenticationPolicy, ExecutionContext, ExecutionFailure, GatewayError,
    GatewayResult, Policy,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

pub const API_KEY_SECURITY_TYPE: &str = "API_KEY";

/// Where to look for the key.
#[derive(Debug, Clone)]
pub struct ApiKeyLocation {
    pub header: String,
    pub query_param: String,
}

impl ApiKeyLocation {
    fn extract(&self, ctx: &ExecutionContext) -> Option<String> {
        ctx.request
            .headers
            .get(&self.header)
            .or_else(|| ctx.request.parameter(&self.query_param))
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }
}

pub struct ApiKeyAuthenticationHandler {
    location: ApiKeyLocation,
    policy: Arc<ApiKeyPolicy>,
}

impl ApiKeyAuthenticationHandler {
    pub fn new(location: ApiKeyLocation, valid_keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let policy = Arc::new(ApiKeyPolicy {
            location: location.clone(),
            valid_keys: valid_keys.into_iter().map(Into::into).collect(),
        });
        Self { location, policy }
    }
}

impl AuthenticationHandler for ApiKeyAuthenticationHandler {
    fn name(&self) -> &str {
        "api-key"
    }

    fn security_type(&self) -> &str {
        API_KEY_SECURITY_TYPE
    }

    fn order(&self) -> i32 {
        500
    }

    fn can_handle(&self, ctx: &ExecutionContext) -> bool {
        self.location.extract(ctx).is_some()
    }

    fn handle(&self, _ctx: &ExecutionContext) -> Vec<AuthenticationPolicy> {
        vec![AuthenticationPolicy::Direct(self.policy.clone())]
    }
}

/// Validates the key and records it on the context.
pub struct ApiKeyPolicy {
    location: ApiKeyLocation,
    valid_keys: HashSet<String>,
}

#[async_trait]
impl Policy for ApiKeyPolicy {
    fn id(&self) -> &str {
        "api-key"
    }

    async fn on_request(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        match self.location.extract(ctx) {
            Some(key) if self.valid_keys.contains(&key) => {
                ctx.request.headers.remove(&self.location.header);
                ctx.metrics.security_token = Some(key.clone());
                ctx.set_attr(ATTR_API_KEY, &key);
                Ok(())
            }
            Some(_) => {
                warn!(request_id = %ctx.request.id, "rejected request: invalid API key");
                Err(GatewayError::failure(
                    ExecutionFailure::new(401)
                        .key("API_KEY_INVALID")
                        .message("Unauthorized"),
                ))
            }
            None => {
                warn!(request_id = %ctx.request.id, "rejected request: missing API key");
                Err(GatewayError::failure(
                    ExecutionFailure::new(401)
                        .key("API_KEY_MISSING")
                        .message("Unauthorized"),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_kernel::{HttpMethod, Request};

    fn handler() -> ApiKeyAuthenticationHandler {
        ApiKeyAuthenticationHandler::new(
            ApiKeyLocation {
                header: "X-Gravitee-Api-Key".into(),
                query_param: "api-key".into(),
            },
            ["good-key"],
        )
    }

    fn policy(handler: &ApiKeyAuthenticationHandler, ctx: &ExecutionContext) -> Arc<dyn Policy> {
        match handler.handle(ctx).remove(0) {
            AuthenticationPolicy::Direct(policy) => policy,
            AuthenticationPolicy::Plugin { .. } => panic!("expected a direct policy"),
        }
    }

    fn failure_key(err: &GatewayError) -> Option<&str> {
        err.execution_failure().and_then(|f| f.key.as_deref())
    }

    #[tokio::test]
    async fn header_key_is_accepted_and_stripped() {
        let handler = handler();
        let mut ctx = ExecutionContext::new(
            Request::new("r1", HttpMethod::Get, "/").with_header("x-gravitee-api-key", "good-key"),
        );
        assert!(handler.can_handle(&ctx));
        policy(&handler, &ctx).on_request(&mut ctx).await.unwrap();
        assert!(!ctx.request.headers.contains("x-gravitee-api-key"));
        assert_eq!(ctx.get_attr::<String>(ATTR_API_KEY).as_deref(), Some("good-key"));
        assert_eq!(ctx.metrics.security_token.as_deref(), Some("good-key"));
    }

    #[tokio::test]
    async fn query_key_is_accepted() {
        let handler = handler();
        let mut ctx = ExecutionContext::new(Request::new("r1", HttpMethod::Get, "/?api-key=good-key"));
        assert!(handler.can_handle(&ctx));
        policy(&handler, &ctx).on_request(&mut ctx).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_and_missing_keys_are_challenged() {
        let handler = handler();
        let mut invalid = ExecutionContext::new(Request::new("r1", HttpMethod::Get, "/?api-key=nope"));
        let err = policy(&handler, &invalid).on_request(&mut invalid).await.unwrap_err();
        assert_eq!(failure_key(&err), Some("API_KEY_INVALID"));

        let mut missing = ExecutionContext::new(Request::new("r2", HttpMethod::Get, "/"));
        assert!(!handler.can_handle(&missing));
        let err = policy(&handler, &missing).on_request(&mut missing).await.unwrap_err();
        assert_eq!(failure_key(&err), Some("API_KEY_MISSING"));
    }
}
