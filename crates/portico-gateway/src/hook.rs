//! `tracing` instrumentation of policy, processor and message execution.

use async_trait::async_trait;
use portico_kernel::{
    ExecutionContext, ExecutionPhase, GatewayError, GatewayResult, Hook, Message, MessageHook,
    MessageScope,
};
use tracing::{debug, trace, warn};

/// Emits one event before and after every wrapped execution, carrying the
/// request id and the elapsed request time.
#[derive(Debug, Default)]
pub struct TracingHook;

impl TracingHook {
    pub fn new() -> Self {
        Self
    }
}

impl Hook for TracingHook {
    fn id(&self) -> &str {
        "tracing"
    }

    fn pre(&self, target: &str, ctx: &ExecutionContext, phase: ExecutionPhase) -> GatewayResult<()> {
        debug!(request_id = %ctx.request.id, target, phase = %phase, "start");
        Ok(())
    }

    fn post(&self, target: &str, ctx: &ExecutionContext, phase: ExecutionPhase) -> GatewayResult<()> {
        debug!(
            request_id = %ctx.request.id,
            target,
            phase = %phase,
            elapsed_ms = ctx.elapsed_ms(),
            "end"
        );
        Ok(())
    }

    fn error(
        &self,
        target: &str,
        ctx: &ExecutionContext,
        phase: ExecutionPhase,
        error: &GatewayError,
    ) -> GatewayResult<()> {
        if error.is_interruption() {
            debug!(request_id = %ctx.request.id, target, phase = %phase, "interrupted");
        } else {
            warn!(request_id = %ctx.request.id, target, phase = %phase, error = %error, "failed");
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHook for TracingHook {
    fn id(&self) -> &str {
        "tracing"
    }

    async fn pre(
        &self,
        target: &str,
        scope: &MessageScope,
        message: &Message,
        phase: ExecutionPhase,
    ) -> GatewayResult<()> {
        trace!(request_id = %scope.request_id, target, phase = %phase, message_id = %message.id, "message start");
        Ok(())
    }

    async fn post(
        &self,
        target: &str,
        scope: &MessageScope,
        message: &Message,
        phase: ExecutionPhase,
    ) -> GatewayResult<()> {
        trace!(request_id = %scope.request_id, target, phase = %phase, message_id = %message.id, "message end");
        Ok(())
    }

    async fn error(
        &self,
        target: &str,
        scope: &MessageScope,
        phase: ExecutionPhase,
        error: &GatewayError,
    ) -> GatewayResult<()> {
        warn!(request_id = %scope.request_id, target, phase = %phase, error = %error, "message failed");
        Ok(())
    }
}
