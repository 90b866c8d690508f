//! Processor chain composition.
//!
//! Processors never assume their position; the factories below own the
//! ordering and the configuration gates of every chain.

use super::chain::ProcessorChain;
use super::cors::{CorsPreflightProcessor, CorsSimpleRequestProcessor};
use super::forward::{XForwardForProcessor, XForwardedPrefixProcessor};
use super::logging::{LogRequestProcessor, LogResponseProcessor};
use super::metrics::{MetricsProcessor, ResponseTimeProcessor};
use super::not_found::NotFoundProcessor;
use super::path_mapping::PathMappingProcessor;
use super::plan::PlanResolverProcessor;
use super::report::{AlertProcessor, ReporterProcessor};
use super::shutdown::ShutdownProcessor;
use super::template::ResponseTemplateProcessor;
use super::trace_context::TraceContextProcessor;
use super::transaction::TransactionProcessor;
use crate::condition::ConditionEvaluator;
use crate::config::GatewayConfig;
use crate::node::Node;
use portico_kernel::{
    AlertEventProducer, ApiDefinition, ExecutionPhase, Hook, Processor, Reporter,
};
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// API chains
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the chains wrapping the execution of one API.
pub struct ApiProcessorChainFactory {
    config: Arc<GatewayConfig>,
    node: Arc<Node>,
    evaluator: Arc<dyn ConditionEvaluator>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl ApiProcessorChainFactory {
    pub fn new(
        config: Arc<GatewayConfig>,
        node: Arc<Node>,
        evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Self {
        Self {
            config,
            node,
            evaluator,
            hooks: Vec::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn Hook>>) -> Self {
        self.hooks = hooks;
        self
    }

    fn max_body_size(&self) -> Option<usize> {
        self.config.reporters.logging_max_size
    }

    /// `[x-forwarded-prefix] → [cors-preflight] → [log-request] → plan-resolver`
    pub fn pre_chain(&self, api: &ApiDefinition) -> ProcessorChain {
        let mut processors: Vec<Arc<dyn Processor>> = Vec::new();
        if self.config.handlers.request.headers.x_forwarded_prefix {
            processors.push(Arc::new(XForwardedPrefixProcessor));
        }
        if let Some(cors) = api.cors() {
            processors.push(Arc::new(CorsPreflightProcessor::new(cors.clone())));
        }
        if api.logging.request {
            processors.push(Arc::new(LogRequestProcessor::new(self.max_body_size())));
        }
        processors.push(Arc::new(PlanResolverProcessor::new(api, self.evaluator.clone())));
        self.chain(format!("api-pre-{}", api.id), ExecutionPhase::Request, processors)
    }

    /// `shutdown → [cors-simple-request] → [log-response] → [path-mapping]`
    pub fn post_chain(&self, api: &ApiDefinition) -> ProcessorChain {
        let mut processors: Vec<Arc<dyn Processor>> =
            vec![Arc::new(ShutdownProcessor::new(self.node.clone()))];
        if let Some(cors) = api.cors() {
            processors.push(Arc::new(CorsSimpleRequestProcessor::new(cors.clone())));
        }
        if api.logging.response {
            processors.push(Arc::new(LogResponseProcessor::new(self.max_body_size())));
        }
        if !api.path_mappings().is_empty() {
            processors.push(Arc::new(PathMappingProcessor::new(api.path_mappings())));
        }
        self.chain(format!("api-post-{}", api.id), ExecutionPhase::Response, processors)
    }

    /// `shutdown → response-template → [log-response]`
    pub fn error_chain(&self, api: &ApiDefinition) -> ProcessorChain {
        let mut processors: Vec<Arc<dyn Processor>> = vec![
            Arc::new(ShutdownProcessor::new(self.node.clone())),
            Arc::new(ResponseTemplateProcessor::new(api)),
        ];
        if api.logging.response {
            processors.push(Arc::new(LogResponseProcessor::new(self.max_body_size())));
        }
        self.chain(format!("api-error-{}", api.id), ExecutionPhase::Response, processors)
    }

    fn chain(&self, id: String, phase: ExecutionPhase, processors: Vec<Arc<dyn Processor>>) -> ProcessorChain {
        ProcessorChain::new(id, phase, processors).with_hooks(self.hooks.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Platform chains
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the chains wrapping every request served by the node.
pub struct PlatformProcessorChainFactory {
    config: Arc<GatewayConfig>,
    node: Arc<Node>,
    reporters: Vec<Arc<dyn Reporter>>,
    alerts: Option<Arc<dyn AlertEventProducer>>,
}

impl PlatformProcessorChainFactory {
    pub fn new(config: Arc<GatewayConfig>, node: Arc<Node>) -> Self {
        Self {
            config,
            node,
            reporters: Vec::new(),
            alerts: None,
        }
    }

    pub fn with_reporters(mut self, reporters: Vec<Arc<dyn Reporter>>) -> Self {
        self.reporters = reporters;
        self
    }

    pub fn with_alert_producer(mut self, producer: Arc<dyn AlertEventProducer>) -> Self {
        self.alerts = Some(producer);
        self
    }

    /// `metrics → [x-forward-for] → transaction → [trace-context]`
    pub fn pre_chain(&self) -> ProcessorChain {
        let request = &self.config.handlers.request;
        let mut processors: Vec<Arc<dyn Processor>> = vec![Arc::new(MetricsProcessor)];
        if request.client_ip.x_forward_enabled {
            processors.push(Arc::new(XForwardForProcessor));
        }
        processors.push(Arc::new(TransactionProcessor::new(
            request.transaction.header.clone(),
            request.request.header.clone(),
        )));
        if request.trace_context.enabled {
            processors.push(Arc::new(TraceContextProcessor));
        }
        ProcessorChain::new("platform-pre", ExecutionPhase::Request, processors)
    }

    /// `response-time → [reporter] → [alert]`
    pub fn post_chain(&self) -> ProcessorChain {
        let mut processors: Vec<Arc<dyn Processor>> = vec![Arc::new(ResponseTimeProcessor)];
        if let Some(reporter) = reporter_processor(&self.config, &self.reporters) {
            processors.push(reporter);
        }
        if let Some(producer) = self.alerts.as_ref().filter(|p| !p.is_empty()) {
            processors.push(Arc::new(AlertProcessor::new(self.node.id(), producer.clone())));
        }
        ProcessorChain::new("platform-post", ExecutionPhase::Response, processors)
    }
}

fn reporter_processor(config: &GatewayConfig, reporters: &[Arc<dyn Reporter>]) -> Option<Arc<dyn Processor>> {
    (config.reporters.enabled && !reporters.is_empty())
        .then(|| Arc::new(ReporterProcessor::new(reporters.to_vec())) as Arc<dyn Processor>)
}

// ─────────────────────────────────────────────────────────────────────────────
// Not found
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the chain answering requests no API serves:
/// `not-found → response-time → [reporter]`.
pub struct NotFoundProcessorChainFactory {
    config: Arc<GatewayConfig>,
    reporters: Vec<Arc<dyn Reporter>>,
}

impl NotFoundProcessorChainFactory {
    pub fn new(config: Arc<GatewayConfig>, reporters: Vec<Arc<dyn Reporter>>) -> Self {
        Self { config, reporters }
    }

    pub fn chain(&self) -> ProcessorChain {
        let mut processors: Vec<Arc<dyn Processor>> =
            vec![Arc::new(NotFoundProcessor), Arc::new(ResponseTimeProcessor)];
        if let Some(reporter) = reporter_processor(&self.config, &self.reporters) {
            processors.push(reporter);
        }
        ProcessorChain::new("not-found", ExecutionPhase::Response, processors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ExpressionConditionEvaluator;
    use crate::reporter::LogReporter;
    use portico_kernel::{AlertEvent, ApiType, CorsSettings, Listener, LoggingSettings};

    struct Producer(bool);

    impl AlertEventProducer for Producer {
        fn is_empty(&self) -> bool {
            self.0
        }

        fn send(&self, _event: AlertEvent) {}
    }

    fn api_factory(config: GatewayConfig) -> ApiProcessorChainFactory {
        ApiProcessorChainFactory::new(
            Arc::new(config),
            Arc::new(Node::new()),
            Arc::new(ExpressionConditionEvaluator::new()),
        )
    }

    fn bare_api() -> ApiDefinition {
        ApiDefinition::new("api", "Api", ApiType::Proxy).with_listener(Listener::http("/api"))
    }

    fn full_api() -> ApiDefinition {
        let listener = Listener::http("/api")
            .with_cors(CorsSettings {
                enabled: true,
                ..CorsSettings::default()
            })
            .with_path_mapping("/items/:id");
        ApiDefinition::new("api", "Api", ApiType::Proxy)
            .with_listener(listener)
            .with_logging(LoggingSettings {
                request: true,
                response: true,
            })
    }

    #[test]
    fn api_chains_without_options() {
        let factory = api_factory(GatewayConfig::default());
        let api = bare_api();
        assert_eq!(factory.pre_chain(&api).processor_ids(), vec!["plan-resolver"]);
        assert_eq!(factory.post_chain(&api).processor_ids(), vec!["shutdown"]);
        assert_eq!(
            factory.error_chain(&api).processor_ids(),
            vec!["shutdown", "response-template"]
        );
    }

    #[test]
    fn api_chains_with_every_option() {
        let mut config = GatewayConfig::default();
        config.handlers.request.headers.x_forwarded_prefix = true;
        let factory = api_factory(config);
        let api = full_api();

        assert_eq!(
            factory.pre_chain(&api).processor_ids(),
            vec!["x-forwarded-prefix", "cors-preflight", "log-request", "plan-resolver"]
        );
        assert_eq!(
            factory.post_chain(&api).processor_ids(),
            vec!["shutdown", "cors-simple-request", "log-response", "path-mapping"]
        );
        assert_eq!(
            factory.error_chain(&api).processor_ids(),
            vec!["shutdown", "response-template", "log-response"]
        );
        assert_eq!(factory.pre_chain(&api).id(), "api-pre-api");
    }

    #[test]
    fn logging_sits_right_before_plan_resolution_without_cors() {
        let factory = api_factory(GatewayConfig::default());
        let api = bare_api().with_logging(LoggingSettings {
            request: true,
            response: false,
        });
        assert_eq!(
            factory.pre_chain(&api).processor_ids(),
            vec!["log-request", "plan-resolver"]
        );
        assert_eq!(factory.post_chain(&api).processor_ids(), vec!["shutdown"]);
    }

    #[test]
    fn platform_chains_follow_configuration() {
        let node = Arc::new(Node::new());
        let mut config = GatewayConfig::default();
        config.reporters.enabled = false;
        let minimal = PlatformProcessorChainFactory::new(Arc::new(config), node.clone())
            .with_reporters(vec![Arc::new(LogReporter::new())])
            .with_alert_producer(Arc::new(Producer(true)));
        assert_eq!(minimal.pre_chain().processor_ids(), vec!["metrics", "transaction"]);
        assert_eq!(minimal.post_chain().processor_ids(), vec!["response-time"]);

        let mut config = GatewayConfig::default();
        config.handlers.request.client_ip.x_forward_enabled = true;
        config.handlers.request.trace_context.enabled = true;
        let full = PlatformProcessorChainFactory::new(Arc::new(config), node)
            .with_reporters(vec![Arc::new(LogReporter::new())])
            .with_alert_producer(Arc::new(Producer(false)));
        assert_eq!(
            full.pre_chain().processor_ids(),
            vec!["metrics", "x-forward-for", "transaction", "trace-context"]
        );
        assert_eq!(
            full.post_chain().processor_ids(),
            vec!["response-time", "reporter", "alert"]
        );
    }

    #[test]
    fn not_found_chain_reports_when_enabled() {
        let factory = NotFoundProcessorChainFactory::new(
            Arc::new(GatewayConfig::default()),
            vec![Arc::new(LogReporter::new())],
        );
        assert_eq!(
            factory.chain().processor_ids(),
            vec!["not-found", "response-time", "reporter"]
        );
        let silent = NotFoundProcessorChainFactory::new(Arc::new(GatewayConfig::default()), Vec::new());
        assert_eq!(silent.chain().processor_ids(), vec!["not-found", "response-time"]);
    }
}
