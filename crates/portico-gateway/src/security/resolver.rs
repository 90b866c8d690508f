//! Authentication handler selection.

use super::registry::AuthenticationHandlerRegistry;
use crate::policy::{DefaultPolicyFactory, PolicyChain};
use async_trait::async_trait;
use portico_kernel::{
    AuthenticationHandler, AuthenticationPolicy, ExecutionContext, ExecutionFailure,
    ExecutionPhase, GatewayError, GatewayResult, Hook, PluginRegistry, Policy,
};
use std::sync::Arc;
use tracing::debug;

/// Fails every request with a bare 401.
pub struct UnauthorizedPolicy;

#[async_trait]
impl Policy for UnauthorizedPolicy {
    fn id(&self) -> &str {
        "unauthorized"
    }

    async fn on_request(&self, _ctx: &mut ExecutionContext) -> GatewayResult<()> {
        Err(GatewayError::failure(
            ExecutionFailure::new(401).message("Unauthorized"),
        ))
    }
}

/// Outcome of a resolution: the chain to run and the handler behind it.
pub struct SecurityResolution {
    pub handler: Option<Arc<dyn AuthenticationHandler>>,
    /// `true` when the handler accepted the request through `can_handle`;
    /// `false` when it was only picked to produce its challenge.
    pub matched: bool,
    pub chain: PolicyChain,
}

pub struct SecurityPolicyResolver {
    handlers: Arc<AuthenticationHandlerRegistry>,
    factory: Arc<DefaultPolicyFactory>,
    plugins: Arc<dyn PluginRegistry>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl SecurityPolicyResolver {
    pub fn new(
        handlers: Arc<AuthenticationHandlerRegistry>,
        factory: Arc<DefaultPolicyFactory>,
        plugins: Arc<dyn PluginRegistry>,
    ) -> Self {
        Self {
            handlers,
            factory,
            plugins,
            hooks: Vec::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn Hook>>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Select the handler for the request and build its policy chain.
    ///
    /// Both request phases authenticate; the response direction yields an
    /// empty chain.  With no accepting handler the first handler in order
    /// still provides the chain, so its challenge is what the client sees.
    /// With no handler at all the chain is a fixed 401.
    pub fn resolve(
        &self,
        phase: ExecutionPhase,
        ctx: &ExecutionContext,
    ) -> GatewayResult<SecurityResolution> {
        if !phase.is_request() {
            return Ok(SecurityResolution {
                handler: None,
                matched: false,
                chain: PolicyChain::empty("security"),
            });
        }

        let handlers = self.handlers.handlers();
        let mut selected = None;
        for handler in handlers.iter() {
            if handler.can_handle(ctx) {
                selected = Some((handler.clone(), true));
                break;
            }
        }
        let selected = selected.or_else(|| handlers.first().map(|h| (h.clone(), false)));

        let Some((handler, matched)) = selected else {
            debug!(request_id = %ctx.request.id, "no authentication handler available");
            return Ok(SecurityResolution {
                handler: None,
                matched: false,
                chain: self.chain("security-unauthorized", vec![Arc::new(UnauthorizedPolicy)]),
            });
        };

        debug!(request_id = %ctx.request.id, handler = handler.name(), matched, "authentication handler selected");
        let policies = handler
            .handle(ctx)
            .into_iter()
            .map(|p| self.normalize(phase, p))
            .collect::<GatewayResult<Vec<_>>>()?;
        Ok(SecurityResolution {
            chain: self.chain(&format!("security-{}", handler.name()), policies),
            handler: Some(handler),
            matched,
        })
    }

    fn normalize(
        &self,
        phase: ExecutionPhase,
        policy: AuthenticationPolicy,
    ) -> GatewayResult<Arc<dyn Policy>> {
        match policy {
            AuthenticationPolicy::Direct(policy) => Ok(policy),
            AuthenticationPolicy::Plugin { policy, configuration } => {
                let manifest = self
                    .plugins
                    .policy(&policy)
                    .ok_or(GatewayError::UnknownPolicy(policy))?;
                self.factory
                    .create(phase, &manifest, &configuration, None)
            }
        }
    }

    fn chain(&self, id: &str, policies: Vec<Arc<dyn Policy>>) -> PolicyChain {
        PolicyChain::new(id, policies).with_hooks(self.hooks.clone())
    }
}
