//! Bridge from legacy request/response policies to [`Policy`].

use async_trait::async_trait;
use portico_kernel::{
    ExecutionContext, ExecutionPhase, GatewayError, GatewayResult, LegacyOutcome, LegacyPolicy,
    Message, MessageFlow, MessageScope, Policy,
};
use std::sync::Arc;

/// Exposes a [`LegacyPolicy`] through the [`Policy`] capability.
///
/// Only the request and response phases are supported; message operations
/// fail with [`GatewayError::LegacyPolicyPhase`].
pub struct LegacyPolicyAdapter {
    policy: Arc<dyn LegacyPolicy>,
}

impl LegacyPolicyAdapter {
    pub fn new(policy: Arc<dyn LegacyPolicy>) -> Self {
        Self { policy }
    }

    fn outcome(outcome: LegacyOutcome) -> GatewayResult<()> {
        match outcome {
            LegacyOutcome::Continue => Ok(()),
            LegacyOutcome::Fail(failure) => Err(GatewayError::failure(failure)),
        }
    }

    fn unsupported(&self, phase: ExecutionPhase) -> GatewayError {
        GatewayError::LegacyPolicyPhase {
            policy: self.policy.id().to_string(),
            phase,
        }
    }
}

#[async_trait]
impl Policy for LegacyPolicyAdapter {
    fn id(&self) -> &str {
        self.policy.id()
    }

    async fn on_request(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        Self::outcome(self.policy.on_request(&mut ctx.request, &mut ctx.response))
    }

    async fn on_response(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        Self::outcome(self.policy.on_response(&mut ctx.request, &mut ctx.response))
    }

    async fn on_message_flow(
        &self,
        _scope: &MessageScope,
        phase: ExecutionPhase,
        _flow: MessageFlow,
    ) -> GatewayResult<MessageFlow> {
        Err(self.unsupported(phase))
    }

    async fn on_message(
        &self,
        _scope: &MessageScope,
        phase: ExecutionPhase,
        _message: Message,
    ) -> GatewayResult<Option<Message>> {
        Err(self.unsupported(phase))
    }
}
