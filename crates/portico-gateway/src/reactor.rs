//! Per-API request orchestration.
//!
//! An [`ApiReactor`] owns everything one deployed API needs at request time
//! and drives a request through it:
//!
//! ```text
//! entrypoint resolution ─▶ API pre chain ─▶ security chain
//!   ─▶ entrypoint request ─▶ plan + API flows (request[, async request])
//!   ─▶ endpoint connector
//!   ─▶ plan + API flows (response[, async response]) ─▶ entrypoint response
//!   ─▶ API post chain
//! ```
//!
//! An interruption skips straight to the post chain.  A failure renders
//! through the error chain, then runs the post chain.

use crate::condition::{ConditionEvaluator, ExpressionConditionEvaluator};
use crate::config::GatewayConfig;
use crate::connector::{EndpointConnectorResolver, EntrypointConnectorResolver};
use crate::hook::TracingHook;
use crate::node::Node;
use crate::policy::{FlowSource, PolicyManager};
use crate::processor::{ApiProcessorChainFactory, ProcessorChain};
use crate::security::{
    API_KEY_SECURITY_TYPE, ApiKeyAuthenticationHandler, ApiKeyLocation,
    AuthenticationHandlerRegistry, KeylessAuthenticationHandler, PlanSecurityEnhancer,
    SecurityChain, SecurityPolicyResolver,
};
use portico_kernel::context::{
    ATTR_API, ATTR_API_NAME, ATTR_CONTEXT_PATH, ATTR_INTERNAL_ENTRYPOINT_MODES,
    ATTR_INTERNAL_EXECUTION_FAILURE,
};
use portico_kernel::{
    ApiDefinition, ApiType, AuthenticationHandler, DeploymentContext, ExecutionContext,
    ExecutionFailure, ExecutionPhase, GatewayError, GatewayResult, Hook, MessageHook,
    PluginRegistry, TemplateVariableProvider,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

pub const NO_ENTRYPOINT_MESSAGE: &str = "No entrypoint matches the incoming request";

// ─────────────────────────────────────────────────────────────────────────────
// Shared services
// ─────────────────────────────────────────────────────────────────────────────

/// Node-wide collaborators every reactor is built from.
#[derive(Clone)]
pub struct ReactorServices {
    pub config: Arc<GatewayConfig>,
    pub node: Arc<Node>,
    pub plugins: Arc<dyn PluginRegistry>,
    pub evaluator: Arc<dyn ConditionEvaluator>,
}

impl ReactorServices {
    pub fn new(config: Arc<GatewayConfig>, node: Arc<Node>, plugins: Arc<dyn PluginRegistry>) -> Self {
        Self {
            config,
            node,
            plugins,
            evaluator: Arc::new(ExpressionConditionEvaluator::new()),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    fn hooks(&self) -> (Vec<Arc<dyn Hook>>, Vec<Arc<dyn MessageHook>>) {
        if !self.config.tracing.enabled {
            return (Vec::new(), Vec::new());
        }
        let hook = Arc::new(TracingHook::new());
        let hooks: Vec<Arc<dyn Hook>> = vec![hook.clone()];
        let message_hooks: Vec<Arc<dyn MessageHook>> = vec![hook];
        (hooks, message_hooks)
    }
}

/// Contributes `#api` to the expression language.
struct ApiVariables(Value);

impl ApiVariables {
    fn new(api: &ApiDefinition) -> Self {
        let api_type = match api.api_type {
            ApiType::Proxy => "proxy",
            ApiType::Message => "message",
        };
        Self(json!({
            "id": api.id,
            "name": api.name,
            "type": api_type,
            "properties": api.properties,
        }))
    }
}

impl TemplateVariableProvider for ApiVariables {
    fn provide(&self, variables: &mut Map<String, Value>) {
        variables.insert("api".to_string(), self.0.clone());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiReactor
// ─────────────────────────────────────────────────────────────────────────────

pub struct ApiReactor {
    api: Arc<ApiDefinition>,
    request_timeout: Option<Duration>,
    drain_timeout: Duration,
    policies: PolicyManager,
    entrypoints: EntrypointConnectorResolver,
    endpoints: EndpointConnectorResolver,
    security: SecurityChain,
    pre_chain: ProcessorChain,
    post_chain: ProcessorChain,
    error_chain: ProcessorChain,
    variables: Arc<ApiVariables>,
    pending: AtomicUsize,
    drained: Notify,
}

impl ApiReactor {
    /// Build every per-API component and instantiate the flow policies.
    pub fn start(api: ApiDefinition, services: &ReactorServices) -> GatewayResult<Self> {
        let api = Arc::new(api);
        let config = &services.config;
        let (hooks, message_hooks) = services.hooks();

        let policies = PolicyManager::new(api.clone(), services.plugins.clone(), services.evaluator.clone())
            .with_hooks(hooks.clone(), message_hooks);
        policies.start()?;

        let handlers = AuthenticationHandlerRegistry::new(authentication_handlers(&api, config))
            .with_enhancer(Arc::new(PlanSecurityEnhancer::new(&api)));
        let resolver = SecurityPolicyResolver::new(Arc::new(handlers), policies.factory(), services.plugins.clone())
            .with_hooks(hooks.clone());

        let chains = ApiProcessorChainFactory::new(config.clone(), services.node.clone(), services.evaluator.clone())
            .with_hooks(hooks);
        let deployment = DeploymentContext::new(api.clone());

        let reactor = Self {
            request_timeout: (config.http.request_timeout_ms > 0)
                .then(|| Duration::from_millis(config.http.request_timeout_ms)),
            drain_timeout: Duration::from_millis(config.http.drain_timeout_ms),
            entrypoints: EntrypointConnectorResolver::new(deployment.clone(), services.plugins.clone()),
            endpoints: EndpointConnectorResolver::new(deployment, services.plugins.clone()),
            security: SecurityChain::new(api.clone(), resolver),
            pre_chain: chains.pre_chain(&api),
            post_chain: chains.post_chain(&api),
            error_chain: chains.error_chain(&api),
            variables: Arc::new(ApiVariables::new(&api)),
            pending: AtomicUsize::new(0),
            drained: Notify::new(),
            policies,
            api,
        };
        info!(api = %reactor.api.id, name = %reactor.api.name, "API reactor started");
        Ok(reactor)
    }

    pub fn api(&self) -> &ApiDefinition {
        &self.api
    }

    pub fn id(&self) -> &str {
        &self.api.id
    }

    /// Requests currently being handled.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Handle one request routed to this API.  Never fails: every outcome is
    /// written into `ctx.response`.
    pub async fn handle(&self, ctx: &mut ExecutionContext) {
        let _in_flight = InFlight::enter(self);
        self.prepare(ctx);

        let outcome = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.execute(ctx))
                .await
                .unwrap_or_else(|_| Err(request_timeout())),
            None => self.execute(ctx).await,
        };
        match outcome {
            Ok(()) => {}
            Err(err) if err.is_interruption() => {
                debug!(api = %self.api.id, request_id = %ctx.request.id, "execution interrupted");
            }
            Err(err) => self.render_failure(ctx, err).await,
        }

        if let Err(err) = self.post_chain.execute(ctx).await {
            if !err.is_interruption() {
                self.render_failure(ctx, err).await;
            }
        }
    }

    fn prepare(&self, ctx: &mut ExecutionContext) {
        if self.api.api_type == ApiType::Message {
            ctx.enable_message_flow();
        }
        ctx.add_template_variable_provider(self.variables.clone());
        ctx.set_attr(ATTR_API, &self.api.id);
        ctx.set_attr(ATTR_API_NAME, &self.api.name);
        let context_path = ctx.request.context_path.clone();
        ctx.set_attr(ATTR_CONTEXT_PATH, &context_path);
        ctx.metrics.api_id = Some(self.api.id.clone());
        ctx.metrics.api_name = Some(self.api.name.clone());
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let entrypoint = self.entrypoints.resolve(ctx).ok_or_else(|| {
            GatewayError::failure(ExecutionFailure::new(404).message(NO_ENTRYPOINT_MESSAGE))
        })?;
        ctx.set_internal_attr(ATTR_INTERNAL_ENTRYPOINT_MODES, &entrypoint.supported_modes().to_vec());

        self.pre_chain.execute(ctx).await?;
        self.security.execute(ctx).await?;

        entrypoint.handle_request(ctx).await?;
        self.run_flows(ctx, ExecutionPhase::Request).await?;
        if ctx.supports_messages() {
            self.run_flows(ctx, ExecutionPhase::AsyncRequest).await?;
        }

        let (endpoint_name, endpoint) = self.endpoints.resolve(ctx).ok_or_else(|| {
            GatewayError::failure(
                ExecutionFailure::new(503)
                    .key("NO_ENDPOINT_FOUND")
                    .message("No endpoint available"),
            )
        })?;
        debug!(api = %self.api.id, request_id = %ctx.request.id, endpoint = %endpoint_name, "invoking endpoint");
        endpoint.connect(ctx).await?;

        self.run_flows(ctx, ExecutionPhase::Response).await?;
        if ctx.supports_messages() {
            self.run_flows(ctx, ExecutionPhase::AsyncResponse).await?;
        }
        entrypoint.handle_response(ctx).await
    }

    /// Plan flows first, then API flows.
    async fn run_flows(&self, ctx: &mut ExecutionContext, phase: ExecutionPhase) -> GatewayResult<()> {
        for source in [FlowSource::Plan, FlowSource::Api] {
            let chain = self.policies.flow_chain(source, phase, ctx)?;
            chain.execute(ctx, phase).await?;
        }
        Ok(())
    }

    async fn render_failure(&self, ctx: &mut ExecutionContext, err: GatewayError) {
        match &err {
            GatewayError::Failure(failure) => {
                debug!(api = %self.api.id, request_id = %ctx.request.id, failure = %failure, "execution failed");
            }
            other => {
                error!(api = %self.api.id, request_id = %ctx.request.id, error = %other, "unexpected execution error");
            }
        }
        let failure = err.to_failure();
        ctx.set_internal_attr(ATTR_INTERNAL_EXECUTION_FAILURE, &failure);
        if let Err(chain_err) = self.error_chain.execute(ctx).await {
            error!(api = %self.api.id, request_id = %ctx.request.id, error = %chain_err, "error chain failed");
            ctx.response.status = failure.status_code;
            ctx.response.headers.set("Content-Type", "text/plain");
            ctx.response.set_body(failure.message.unwrap_or_default());
        }
    }

    /// Stop accepting requests, wait for in-flight ones (bounded by the
    /// drain timeout), then release connectors and policies.  In-flight
    /// requests keep reaching their endpoint while draining.
    pub async fn stop(&self) {
        info!(api = %self.api.id, pending = self.pending(), "stopping API reactor");
        self.entrypoints.pre_stop().await;
        self.drain().await;

        self.endpoints.pre_stop().await;
        self.security.stop();
        self.entrypoints.stop().await;
        self.endpoints.stop().await;
        self.policies.stop();
        info!(api = %self.api.id, "API reactor stopped");
    }

    async fn drain(&self) {
        let wait = async {
            loop {
                let notified = self.drained.notified();
                if self.pending() == 0 {
                    return;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(self.drain_timeout, wait).await.is_err() {
            warn!(api = %self.api.id, pending = self.pending(), "drain timed out, stopping anyway");
        }
    }
}

fn request_timeout() -> GatewayError {
    GatewayError::failure(
        ExecutionFailure::new(504)
            .key("REQUEST_TIMEOUT")
            .message("Request timeout"),
    )
}

/// API-key handler (global keys plus the `keys` of every API-key plan) and
/// keyless handler; the plan enhancer later keeps the ones plans use.
fn authentication_handlers(api: &ApiDefinition, config: &GatewayConfig) -> Vec<Arc<dyn AuthenticationHandler>> {
    let mut keys = config.security.api_keys.clone();
    for plan in api
        .plans
        .iter()
        .filter(|p| p.security.security_type.eq_ignore_ascii_case(API_KEY_SECURITY_TYPE))
    {
        if let Some(Value::Array(values)) = plan.security.configuration.get("keys") {
            keys.extend(values.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }
    let location = ApiKeyLocation {
        header: config.security.api_key_header.clone(),
        query_param: config.security.api_key_query_param.clone(),
    };
    vec![
        Arc::new(ApiKeyAuthenticationHandler::new(location, keys)),
        Arc::new(KeylessAuthenticationHandler),
    ]
}

/// Counts a request as pending for as long as it lives.
struct InFlight<'a>(&'a ApiReactor);

impl<'a> InFlight<'a> {
    fn enter(reactor: &'a ApiReactor) -> Self {
        reactor.pending.fetch_add(1, Ordering::SeqCst);
        Self(reactor)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}
