//! Condition-guarded policy decorator.

use crate::condition::ConditionEvaluator;
use async_trait::async_trait;
use portico_kernel::{
    ExecutionContext, ExecutionPhase, GatewayResult, Message, MessageFlow, MessageScope, Policy,
};
use serde_json::{Value, json};
use std::sync::Arc;

/// Runs the wrapped policy only when its guard evaluates to `true`.
///
/// A `false` guard completes the operation as a no-op (or passes the
/// message/flow through unchanged); an evaluation error fails the
/// operation.  `id()` is the wrapped policy's id.
pub struct ConditionalPolicy {
    policy: Arc<dyn Policy>,
    condition: String,
    evaluator: Arc<dyn ConditionEvaluator>,
    subject: Value,
}

impl ConditionalPolicy {
    pub fn new(
        policy: Arc<dyn Policy>,
        condition: impl Into<String>,
        evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Self {
        let condition = condition.into();
        let subject = json!({ "id": policy.id(), "condition": condition });
        Self {
            policy,
            condition,
            evaluator,
            subject,
        }
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    async fn test(&self, variables: &Value) -> GatewayResult<bool> {
        self.evaluator
            .evaluate(&self.condition, variables, &self.subject)
            .await
    }
}

#[async_trait]
impl Policy for ConditionalPolicy {
    fn id(&self) -> &str {
        self.policy.id()
    }

    async fn on_request(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        if self.test(&ctx.template_variables()).await? {
            self.policy.on_request(ctx).await?;
        }
        Ok(())
    }

    async fn on_response(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        if self.test(&ctx.template_variables()).await? {
            self.policy.on_response(ctx).await?;
        }
        Ok(())
    }

    async fn on_message_flow(
        &self,
        scope: &MessageScope,
        phase: ExecutionPhase,
        flow: MessageFlow,
    ) -> GatewayResult<MessageFlow> {
        if self.test(&scope.variables).await? {
            self.policy.on_message_flow(scope, phase, flow).await
        } else {
            Ok(flow)
        }
    }

    async fn on_message(
        &self,
        scope: &MessageScope,
        phase: ExecutionPhase,
        message: Message,
    ) -> GatewayResult<Option<Message>> {
        if self.test(&scope.variables_for(&message)).await? {
            self.policy.on_message(scope, phase, message).await
        } else {
            Ok(Some(message))
        }
    }
}
