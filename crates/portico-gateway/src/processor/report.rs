//! Metrics reporting and alert emission.

use async_trait::async_trait;
use portico_kernel::{
    AlertEvent, AlertEventProducer, ExecutionContext, GatewayResult, Processor, Reporter,
};
use std::sync::Arc;
use tracing::warn;

/// Hands the metrics record to every reporter.  Reporter failures are
/// logged and never fail the request.
pub struct ReporterProcessor {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl ReporterProcessor {
    pub fn new(reporters: Vec<Arc<dyn Reporter>>) -> Self {
        Self { reporters }
    }
}

#[async_trait]
impl Processor for ReporterProcessor {
    fn id(&self) -> &str {
        "reporter"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        for reporter in &self.reporters {
            if let Err(err) = reporter.report(&ctx.metrics).await {
                warn!(reporter = reporter.id(), request_id = %ctx.request.id, error = %err, "reporting failed");
            }
        }
        Ok(())
    }
}

/// Emits a `REQUEST` alert event describing the finished request.
pub struct AlertProcessor {
    node_id: String,
    producer: Arc<dyn AlertEventProducer>,
}

impl AlertProcessor {
    pub fn new(node_id: impl Into<String>, producer: Arc<dyn AlertEventProducer>) -> Self {
        Self {
            node_id: node_id.into(),
            producer,
        }
    }
}

#[async_trait]
impl Processor for AlertProcessor {
    fn id(&self) -> &str {
        "alert"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let metrics = &ctx.metrics;
        let mut event = AlertEvent::new("REQUEST", metrics.timestamp_ms)
            .property("node.id", self.node_id.as_str())
            .property("request.id", metrics.request_id.as_str())
            .property("response.status", metrics.status)
            .property("response.response_time", metrics.gateway_response_time_ms);
        if let Some(api) = &metrics.api_id {
            event = event.property("api", api.as_str());
        }
        if let Some(plan) = &metrics.plan_id {
            event = event.property("plan", plan.as_str());
        }
        if let Some(latency) = metrics.gateway_latency_ms {
            event = event.property("response.latency", latency);
        }
        if let Some(key) = &metrics.error_key {
            event = event.property("error.key", key.as_str());
        }
        self.producer.send(event);
        Ok(())
    }
}
