//! Per-API security step: authenticate, then bind the request to a plan.

use super::resolver::SecurityPolicyResolver;
use portico_kernel::context::{ATTR_INTERNAL_ELIGIBLE_PLANS, ATTR_PLAN};
use portico_kernel::{
    ApiDefinition, ExecutionContext, ExecutionFailure, ExecutionPhase, GatewayError, GatewayResult,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub struct SecurityChain {
    api: Arc<ApiDefinition>,
    resolver: SecurityPolicyResolver,
    stopped: AtomicBool,
}

impl SecurityChain {
    pub fn new(api: Arc<ApiDefinition>, resolver: SecurityPolicyResolver) -> Self {
        Self {
            api,
            resolver,
            stopped: AtomicBool::new(false),
        }
    }

    /// Run the authentication chain and record the plan serving the request.
    ///
    /// The plan is the first one, in declaration order, that the plan
    /// resolver found eligible and whose security type is the selected
    /// handler's.  Fails with 401 when no plan qualifies or once the chain
    /// is stopped.
    pub async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(unauthorized());
        }

        let resolution = self.resolver.resolve(ExecutionPhase::Request, ctx)?;
        resolution.chain.execute(ctx, ExecutionPhase::Request).await?;

        let handler = match resolution.handler {
            Some(handler) if resolution.matched => handler,
            _ => return Err(unauthorized()),
        };

        let eligible: Option<Vec<String>> = ctx.get_internal_attr(ATTR_INTERNAL_ELIGIBLE_PLANS);
        let plan = self.api.plans.iter().find(|plan| {
            eligible.as_ref().is_none_or(|ids| ids.contains(&plan.id))
                && plan
                    .security
                    .security_type
                    .eq_ignore_ascii_case(handler.security_type())
        });
        let Some(plan) = plan else {
            debug!(api = %self.api.id, handler = handler.name(), "no plan matches the authenticated request");
            return Err(unauthorized());
        };

        ctx.set_attr(ATTR_PLAN, &plan.id);
        ctx.metrics.plan_id = Some(plan.id.clone());
        ctx.metrics.security_type = Some(plan.security.security_type.clone());
        Ok(())
    }

    /// Refuse every later request.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

fn unauthorized() -> GatewayError {
    GatewayError::failure(ExecutionFailure::new(401).message("Unauthorized"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ExpressionConditionEvaluator;
    use crate::policy::DefaultPolicyFactory;
    use crate::registry::InMemoryPluginRegistry;
    use crate::security::{
        ApiKeyAuthenticationHandler, ApiKeyLocation, AuthenticationHandlerRegistry,
        KeylessAuthenticationHandler, PlanSecurityEnhancer,
    };
    use portico_kernel::{ApiType, AuthenticationHandler, HttpMethod, Plan, Request};

    fn chain(api: ApiDefinition) -> SecurityChain {
        let api = Arc::new(api);
        let handlers: Vec<Arc<dyn AuthenticationHandler>> = vec![
            Arc::new(KeylessAuthenticationHandler),
            Arc::new(ApiKeyAuthenticationHandler::new(
                ApiKeyLocation {
                    header: "X-Gravitee-Api-Key".into(),
                    query_param: "api-key".into(),
                },
                ["k1"],
            )),
        ];
        let registry = AuthenticationHandlerRegistry::new(handlers)
            .with_enhancer(Arc::new(PlanSecurityEnhancer::new(&api)));
        let resolver = SecurityPolicyResolver::new(
            Arc::new(registry),
            Arc::new(DefaultPolicyFactory::new(Arc::new(ExpressionConditionEvaluator::new()))),
            Arc::new(InMemoryPluginRegistry::new()),
        );
        SecurityChain::new(api, resolver)
    }

    fn ctx(uri: &str) -> ExecutionContext {
        ExecutionContext::new(Request::new("r1", HttpMethod::Get, uri))
    }

    fn status(err: GatewayError) -> Option<u16> {
        err.execution_failure().map(|f| f.status_code)
    }

    #[tokio::test]
    async fn keyed_request_binds_the_api_key_plan() {
        let chain = chain(
            ApiDefinition::new("api", "Api", ApiType::Proxy)
                .with_plan(Plan::new("open", "KEY_LESS"))
                .with_plan(Plan::new("gold", "API_KEY")),
        );
        let mut keyed = ctx("/?api-key=k1");
        chain.execute(&mut keyed).await.unwrap();
        assert_eq!(keyed.get_attr::<String>(ATTR_PLAN).as_deref(), Some("gold"));
        assert_eq!(keyed.metrics.security_type.as_deref(), Some("API_KEY"));

        let mut anonymous = ctx("/");
        chain.execute(&mut anonymous).await.unwrap();
        assert_eq!(anonymous.get_attr::<String>(ATTR_PLAN).as_deref(), Some("open"));
    }

    #[tokio::test]
    async fn eligible_plans_restrict_the_binding() {
        let chain = chain(
            ApiDefinition::new("api", "Api", ApiType::Proxy)
                .with_plan(Plan::new("first", "KEY_LESS"))
                .with_plan(Plan::new("second", "KEY_LESS")),
        );
        let mut restricted = ctx("/");
        restricted.set_internal_attr(ATTR_INTERNAL_ELIGIBLE_PLANS, &vec!["second".to_string()]);
        chain.execute(&mut restricted).await.unwrap();
        assert_eq!(restricted.get_attr::<String>(ATTR_PLAN).as_deref(), Some("second"));

        let mut none = ctx("/");
        none.set_internal_attr(ATTR_INTERNAL_ELIGIBLE_PLANS, &Vec::<String>::new());
        assert_eq!(status(chain.execute(&mut none).await.unwrap_err()), Some(401));
    }

    #[tokio::test]
    async fn missing_key_gets_the_api_key_challenge() {
        let chain = chain(ApiDefinition::new("api", "Api", ApiType::Proxy).with_plan(Plan::new("gold", "API_KEY")));
        let err = chain.execute(&mut ctx("/")).await.unwrap_err();
        assert_eq!(
            err.execution_failure().and_then(|f| f.key.as_deref()),
            Some("API_KEY_MISSING")
        );
    }

    #[tokio::test]
    async fn stopped_chain_fails_closed() {
        let chain = chain(ApiDefinition::new("api", "Api", ApiType::Proxy).with_plan(Plan::new("open", "KEY_LESS")));
        chain.stop();
        assert_eq!(status(chain.execute(&mut ctx("/")).await.unwrap_err()), Some(401));
    }
}
