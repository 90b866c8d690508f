//! Per-API policy lifecycle: deploy-time instantiation, per-request flow
//! chains, undeploy cleanup.

use super::chain::PolicyChain;
use super::factory::DefaultPolicyFactory;
use crate::condition::ConditionEvaluator;
use crate::routing::PathPattern;
use parking_lot::RwLock;
use portico_kernel::context::ATTR_PLAN;
use portico_kernel::{
    ApiDefinition, ApiType, ExecutionContext, ExecutionPhase, Flow, GatewayError, GatewayResult,
    Hook, MessageHook, PluginRegistry, Policy, PolicyManifest, Step,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Which flows of the API a chain is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSource {
    /// Flows of the plan bound to the request by the security chain.
    Plan,
    /// Flows declared at API level.
    Api,
}

impl fmt::Display for FlowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowSource::Plan => "plan",
            FlowSource::Api => "api",
        })
    }
}

pub struct PolicyManager {
    api: Arc<ApiDefinition>,
    registry: Arc<dyn PluginRegistry>,
    factory: Arc<DefaultPolicyFactory>,
    manifests: RwLock<HashMap<String, PolicyManifest>>,
    hooks: Vec<Arc<dyn Hook>>,
    message_hooks: Vec<Arc<dyn MessageHook>>,
    stopped: AtomicBool,
}

impl PolicyManager {
    pub fn new(
        api: Arc<ApiDefinition>,
        registry: Arc<dyn PluginRegistry>,
        evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Self {
        Self {
            api,
            registry,
            factory: Arc::new(DefaultPolicyFactory::new(evaluator)),
            manifests: RwLock::new(HashMap::new()),
            hooks: Vec::new(),
            message_hooks: Vec::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn Hook>>, message_hooks: Vec<Arc<dyn MessageHook>>) -> Self {
        self.hooks = hooks;
        self.message_hooks = message_hooks;
        self
    }

    /// Factory shared with the security chain of the same deployment.
    pub fn factory(&self) -> Arc<DefaultPolicyFactory> {
        self.factory.clone()
    }

    pub fn hooks(&self) -> &[Arc<dyn Hook>] {
        &self.hooks
    }

    /// Instantiate every enabled step of every API and plan flow.
    ///
    /// Fails on the first step naming an unknown policy or a policy that
    /// cannot be created for its phase.
    pub fn start(&self) -> GatewayResult<()> {
        let mut created = 0usize;
        for flow in self.all_flows() {
            for &phase in self.phases() {
                for step in enabled_steps(flow, phase) {
                    if self.policy_for(phase, step)?.is_some() {
                        created += 1;
                    }
                }
            }
        }
        info!(api = %self.api.id, policies = created, "policies ready");
        Ok(())
    }

    /// Clean up every manifest this deployment used.
    ///
    /// Chains requested afterwards fail with [`GatewayError::Undeployed`].
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let manifests: Vec<PolicyManifest> = self.manifests.write().drain().map(|(_, m)| m).collect();
        for manifest in &manifests {
            self.factory.cleanup(manifest);
        }
        debug!(api = %self.api.id, manifests = manifests.len(), "policies cleaned up");
    }

    /// Chain of the `source` flows matching the request for `phase`.
    pub fn flow_chain(
        &self,
        source: FlowSource,
        phase: ExecutionPhase,
        ctx: &ExecutionContext,
    ) -> GatewayResult<PolicyChain> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(GatewayError::Undeployed(self.api.id.clone()));
        }
        let flows: &[Flow] = match source {
            FlowSource::Api => &self.api.flows,
            FlowSource::Plan => match ctx.get_attr::<String>(ATTR_PLAN).and_then(|id| self.api.plan(&id)) {
                Some(plan) => &plan.flows,
                None => &[],
            },
        };

        let mut policies = Vec::new();
        for flow in flows.iter().filter(|f| flow_matches(f, ctx)) {
            for step in enabled_steps(flow, phase) {
                if let Some(policy) = self.policy_for(phase, step)? {
                    policies.push(policy);
                }
            }
        }

        Ok(PolicyChain::new(
            format!("{}-{}-{}", self.api.id, source, phase.label()),
            policies,
        )
        .with_hooks(self.hooks.clone())
        .with_message_hooks(self.message_hooks.clone()))
    }

    fn policy_for(&self, phase: ExecutionPhase, step: &Step) -> GatewayResult<Option<Arc<dyn Policy>>> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(GatewayError::Undeployed(self.api.id.clone()));
        }
        let manifest = self.manifest(&step.policy)?;
        if !manifest.supports(phase.stream_type()) {
            debug!(policy = %step.policy, phase = %phase, "policy does not support phase, skipped");
            return Ok(None);
        }
        self.factory
            .create(phase, &manifest, &step.configuration, step.condition.as_deref())
            .map(Some)
    }

    fn manifest(&self, id: &str) -> GatewayResult<PolicyManifest> {
        if let Some(manifest) = self.manifests.read().get(id) {
            return Ok(manifest.clone());
        }
        let manifest = self
            .registry
            .policy(id)
            .ok_or_else(|| GatewayError::UnknownPolicy(id.to_string()))?;
        self.manifests
            .write()
            .entry(id.to_string())
            .or_insert(manifest.clone());
        Ok(manifest)
    }

    fn all_flows(&self) -> impl Iterator<Item = &Flow> {
        self.api
            .plans
            .iter()
            .flat_map(|p| p.flows.iter())
            .chain(self.api.flows.iter())
    }

    fn phases(&self) -> &'static [ExecutionPhase] {
        match self.api.api_type {
            ApiType::Proxy => &[ExecutionPhase::Request, ExecutionPhase::Response],
            ApiType::Message => &[
                ExecutionPhase::Request,
                ExecutionPhase::Response,
                ExecutionPhase::AsyncRequest,
                ExecutionPhase::AsyncResponse,
            ],
        }
    }
}

/// Steps of `flow` bound to `phase`, disabled ones excluded.
fn enabled_steps(flow: &Flow, phase: ExecutionPhase) -> impl Iterator<Item = &Step> {
    let steps = if !flow.enabled {
        &[][..]
    } else {
        match phase {
            ExecutionPhase::Request => flow.request.as_slice(),
            ExecutionPhase::Response => flow.response.as_slice(),
            ExecutionPhase::AsyncRequest => flow.publish.as_slice(),
            ExecutionPhase::AsyncResponse => flow.subscribe.as_slice(),
        }
    };
    steps.iter().filter(|s| s.enabled)
}

/// Path prefix on `path_info`, then the method list (empty means any).
fn flow_matches(flow: &Flow, ctx: &ExecutionContext) -> bool {
    if !flow.enabled || !PathPattern::new(flow.selector.path.as_str()).matches_prefix(&ctx.request.path_info) {
        return false;
    }
    flow.selector.methods.is_empty()
        || flow
            .selector
            .methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(ctx.request.method.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ExpressionConditionEvaluator;
    use async_trait::async_trait;
    use portico_kernel::{
        EndpointConnectorFactory, EntrypointConnectorFactory, HttpMethod, Plan, PolicyPluginFactory,
        Request, StreamType,
    };
    use serde_json::{Value, json};
    use std::sync::atomic::AtomicUsize;

    struct Named(String);

    #[async_trait]
    impl Policy for Named {
        fn id(&self) -> &str {
            &self.0
        }
    }

    #[derive(Default)]
    struct TagFactory {
        cleaned: AtomicUsize,
    }

    impl PolicyPluginFactory for TagFactory {
        fn create(&self, configuration: &Value) -> GatewayResult<Arc<dyn Policy>> {
            let tag = configuration["tag"].as_str().unwrap_or("untagged").to_string();
            Ok(Arc::new(Named(tag)))
        }

        fn cleanup(&self) {
            self.cleaned.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Registry {
        tag: Arc<TagFactory>,
    }

    impl PluginRegistry for Registry {
        fn policy(&self, id: &str) -> Option<PolicyManifest> {
            match id {
                "tag" => Some(PolicyManifest::native("tag", self.tag.clone())),
                "request-only" => Some(
                    PolicyManifest::native("request-only", self.tag.clone())
                        .with_stream_types(vec![StreamType::OnRequest]),
                ),
                _ => None,
            }
        }

        fn entrypoint_factory(&self, _id: &str) -> Option<Arc<dyn EntrypointConnectorFactory>> {
            None
        }

        fn endpoint_factory(&self, _id: &str) -> Option<Arc<dyn EndpointConnectorFactory>> {
            None
        }
    }

    fn tag(name: &str) -> Step {
        Step::new("tag").with_configuration(json!({ "tag": name }))
    }

    fn build(api: ApiDefinition) -> (Arc<TagFactory>, PolicyManager) {
        let tag = Arc::new(TagFactory::default());
        let manager = PolicyManager::new(
            Arc::new(api),
            Arc::new(Registry { tag: tag.clone() }),
            Arc::new(ExpressionConditionEvaluator::new()),
        );
        (tag, manager)
    }

    fn ctx(method: HttpMethod, path_info: &str) -> ExecutionContext {
        let mut request = Request::new("r1", method, format!("/api{path_info}"));
        request.bind_context_path("/api");
        ExecutionContext::new(request)
    }

    #[test]
    fn flows_are_selected_by_path_and_method() {
        let api = ApiDefinition::new("api-1", "Api", ApiType::Proxy)
            .with_flow(Flow::new("all").on_request(tag("all")))
            .with_flow(
                Flow::new("items-post")
                    .with_selector("/items", vec!["POST".into()])
                    .on_request(tag("items"))
                    .on_request(tag("disabled").disabled()),
            );
        let (_, manager) = build(api);
        manager.start().unwrap();

        let get = manager
            .flow_chain(FlowSource::Api, ExecutionPhase::Request, &ctx(HttpMethod::Get, "/items/1"))
            .unwrap();
        assert_eq!(get.len(), 1);

        let post = manager
            .flow_chain(FlowSource::Api, ExecutionPhase::Request, &ctx(HttpMethod::Post, "/items/1"))
            .unwrap();
        assert_eq!(post.len(), 2);
        assert_eq!(post.id(), "api-1-api-request");
    }

    #[test]
    fn plan_flows_follow_the_bound_plan() {
        let api = ApiDefinition::new("api-1", "Api", ApiType::Proxy).with_plan(
            Plan::new("gold", "KEY_LESS").with_flow(Flow::new("gold").on_request(tag("gold"))),
        );
        let (_, manager) = build(api);

        let mut unbound = ctx(HttpMethod::Get, "/");
        assert!(manager
            .flow_chain(FlowSource::Plan, ExecutionPhase::Request, &unbound)
            .unwrap()
            .is_empty());

        unbound.set_attr(ATTR_PLAN, &"gold");
        assert_eq!(
            manager
                .flow_chain(FlowSource::Plan, ExecutionPhase::Request, &unbound)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn unsupported_phase_is_skipped_and_unknown_policy_fails() {
        let api = ApiDefinition::new("api-1", "Api", ApiType::Proxy)
            .with_flow(Flow::new("f").on_response(Step::new("request-only")));
        let (_, manager) = build(api);
        manager.start().unwrap();
        let chain = manager
            .flow_chain(FlowSource::Api, ExecutionPhase::Response, &ctx(HttpMethod::Get, "/"))
            .unwrap();
        assert!(chain.is_empty());

        let broken = ApiDefinition::new("api-2", "Api", ApiType::Proxy)
            .with_flow(Flow::new("f").on_request(Step::new("missing")));
        let (_, manager) = build(broken);
        assert!(matches!(manager.start(), Err(GatewayError::UnknownPolicy(id)) if id == "missing"));
    }

    #[test]
    fn stop_cleans_up_used_manifests() {
        let api = ApiDefinition::new("api-1", "Api", ApiType::Proxy)
            .with_flow(Flow::new("f").on_request(tag("a")).on_response(tag("b")));
        let (tag, manager) = build(api);
        manager.start().unwrap();
        assert_eq!(manager.factory().len(), 2);

        manager.stop();
        assert_eq!(tag.cleaned.load(Ordering::SeqCst), 1);
        assert!(manager.factory().is_empty());
    }

    #[test]
    fn chains_fail_closed_after_stop() {
        let api = ApiDefinition::new("api-1", "Api", ApiType::Proxy)
            .with_flow(Flow::new("f").on_request(tag("a")));
        let (tag, manager) = build(api);
        manager.start().unwrap();
        manager.stop();

        let result = manager.flow_chain(FlowSource::Api, ExecutionPhase::Request, &ctx(HttpMethod::Get, "/"));
        assert!(matches!(result, Err(GatewayError::Undeployed(id)) if id == "api-1"));
        assert!(manager.factory().is_empty());
        assert!(manager.manifests.read().is_empty());
        assert_eq!(tag.cleaned.load(Ordering::SeqCst), 1);
    }
}
