//! Metrics capture at both ends of the platform chains.

use async_trait::async_trait;
use portico_kernel::{ExecutionContext, GatewayResult, Processor};

/// Snapshots request attributes into the metrics record.
pub struct MetricsProcessor;

#[async_trait]
impl Processor for MetricsProcessor {
    fn id(&self) -> &str {
        "metrics"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let request = &ctx.request;
        let metrics = &mut ctx.metrics;
        metrics.request_id = request.id.clone();
        metrics.http_method = request.method.as_str().to_string();
        metrics.uri = request.uri.clone();
        metrics.host = request.host.clone();
        metrics.local_address = request.local_address.clone();
        metrics.remote_address = request.remote_address.clone();
        metrics.user_agent = request.headers.get("user-agent").map(str::to_string);
        metrics.request_content_length = request.body.len() as u64;
        Ok(())
    }
}

/// Completes the record once the response is final.
pub struct ResponseTimeProcessor;

#[async_trait]
impl Processor for ResponseTimeProcessor {
    fn id(&self) -> &str {
        "response-time"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let elapsed = ctx.elapsed_ms();
        let metrics = &mut ctx.metrics;
        metrics.gateway_response_time_ms = elapsed;
        metrics.gateway_latency_ms = metrics
            .endpoint_response_time_ms
            .map(|endpoint| elapsed.saturating_sub(endpoint));
        metrics.status = ctx.response.status;
        metrics.response_content_length = ctx.response.body.len() as u64;
        metrics.path_info = ctx.request.path_info.clone();
        Ok(())
    }
}
