use async_trait::async_trait;
use portico_kernel::{ExecutionContext, GatewayResult, Processor};

pub const NOT_FOUND_MESSAGE: &str = "No context-path matches the request URI.";

/// Answers requests no deployed API serves.
pub struct NotFoundProcessor;

#[async_trait]
impl Processor for NotFoundProcessor {
    fn id(&self) -> &str {
        "not-found"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        ctx.response.status = 404;
        ctx.response.headers.set("Content-Type", "text/plain");
        ctx.response.set_body(NOT_FOUND_MESSAGE);
        ctx.response.end();

        ctx.metrics.api_id = None;
        ctx.metrics.path_info = ctx.request.path.clone();
        ctx.metrics.error_key = Some("NOT_FOUND".to_string());
        Ok(())
    }
}
