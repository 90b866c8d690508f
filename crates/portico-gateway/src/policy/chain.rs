//! Sequential policy execution engine.

use futures::StreamExt;
use futures::future;
use portico_kernel::{
    ExecutionContext, ExecutionPhase, GatewayError, GatewayResult, Hook, Message, MessageFlow,
    MessageHook, MessageScope, Policy,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Ordered list of policies executed for one phase of one request.
///
/// The chain holds no request state: it is built from an already resolved
/// policy list and may be executed any number of times.  Policies run
/// strictly one after the other in declared order and the first failure
/// ends the phase.
#[derive(Clone)]
pub struct PolicyChain {
    id: String,
    policies: Vec<Arc<dyn Policy>>,
    hooks: Vec<Arc<dyn Hook>>,
    message_hooks: Vec<Arc<dyn MessageHook>>,
}

impl PolicyChain {
    pub fn new(id: impl Into<String>, policies: Vec<Arc<dyn Policy>>) -> Self {
        Self {
            id: id.into(),
            policies,
            hooks: Vec::new(),
            message_hooks: Vec::new(),
        }
    }

    /// Chain with no policy; always completes.
    pub fn empty(id: impl Into<String>) -> Self {
        Self::new(id, Vec::new())
    }

    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn Hook>>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_message_hooks(mut self, hooks: Vec<Arc<dyn MessageHook>>) -> Self {
        self.message_hooks = hooks;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Run the chain for `phase`.
    ///
    /// Sync phases invoke each policy's request or response operation.  Async
    /// phases invoke the same operations first and, once all completed, wrap
    /// the phase's message flow with every policy's `on_message_flow` and
    /// per-message `on_message`.  An async phase on a context that cannot
    /// carry messages is rejected before any policy runs.
    pub async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        phase: ExecutionPhase,
    ) -> GatewayResult<()> {
        if phase.is_async() && !ctx.supports_messages() {
            return Err(GatewayError::ContextMismatch { phase });
        }
        if self.policies.is_empty() {
            return Ok(());
        }
        debug!(chain = %self.id, phase = %phase, policies = self.policies.len(), "executing policy chain");

        for policy in &self.policies {
            self.run_policy(policy, ctx, phase).await?;
        }

        if phase.is_async() {
            self.wrap_messages(ctx, phase).await?;
        }
        Ok(())
    }

    async fn run_policy(
        &self,
        policy: &Arc<dyn Policy>,
        ctx: &mut ExecutionContext,
        phase: ExecutionPhase,
    ) -> GatewayResult<()> {
        for hook in &self.hooks {
            if let Err(err) = hook.pre(policy.id(), ctx, phase) {
                warn!(hook = hook.id(), policy = policy.id(), error = %err, "pre hook failed");
            }
        }

        let result = if phase.is_request() {
            policy.on_request(ctx).await
        } else {
            policy.on_response(ctx).await
        };

        for hook in &self.hooks {
            let outcome = match &result {
                Ok(()) => hook.post(policy.id(), ctx, phase),
                Err(err) => hook.error(policy.id(), ctx, phase, err),
            };
            if let Err(err) = outcome {
                warn!(hook = hook.id(), policy = policy.id(), error = %err, "post hook failed");
            }
        }
        result
    }

    async fn wrap_messages(&self, ctx: &mut ExecutionContext, phase: ExecutionPhase) -> GatewayResult<()> {
        let Some(mut flow) = ctx.messages_mut(phase).take() else {
            return Ok(());
        };
        let scope = Arc::new(ctx.message_scope());

        for policy in &self.policies {
            flow = policy.on_message_flow(&scope, phase, flow).await?;
            flow = per_message(
                flow,
                policy.clone(),
                scope.clone(),
                phase,
                self.message_hooks.clone(),
            );
        }

        *ctx.messages_mut(phase) = Some(stop_after_error(flow));
        Ok(())
    }
}

/// Apply `policy.on_message` to every message, one at a time, with message
/// hooks around each call.  Dropped messages (`None`) are filtered out.
fn per_message(
    flow: MessageFlow,
    policy: Arc<dyn Policy>,
    scope: Arc<MessageScope>,
    phase: ExecutionPhase,
    hooks: Vec<Arc<dyn MessageHook>>,
) -> MessageFlow {
    let hooks = Arc::new(hooks);
    flow.then(move |item| {
        let policy = policy.clone();
        let scope = scope.clone();
        let hooks = hooks.clone();
        async move {
            let message = item?;
            on_message_with_hooks(policy.as_ref(), &scope, phase, &hooks, message).await
        }
    })
    .filter_map(|item: GatewayResult<Option<Message>>| future::ready(item.transpose()))
    .boxed()
}

async fn on_message_with_hooks(
    policy: &dyn Policy,
    scope: &MessageScope,
    phase: ExecutionPhase,
    hooks: &[Arc<dyn MessageHook>],
    message: Message,
) -> GatewayResult<Option<Message>> {
    for hook in hooks {
        if let Err(err) = hook.pre(policy.id(), scope, &message, phase).await {
            warn!(hook = hook.id(), policy = policy.id(), error = %err, "message pre hook failed");
        }
    }
    let snapshot = if hooks.is_empty() {
        None
    } else {
        Some(message.clone())
    };

    let result = policy.on_message(scope, phase, message).await;

    for hook in hooks {
        let outcome = match (&result, &snapshot) {
            (Ok(Some(out)), _) => hook.post(policy.id(), scope, out, phase).await,
            (Ok(None), Some(original)) => hook.post(policy.id(), scope, original, phase).await,
            (Ok(None), None) => Ok(()),
            (Err(err), _) => hook.error(policy.id(), scope, phase, err).await,
        };
        if let Err(err) = outcome {
            warn!(hook = hook.id(), policy = policy.id(), error = %err, "message post hook failed");
        }
    }
    result
}

/// End the flow right after its first error item.
fn stop_after_error(flow: MessageFlow) -> MessageFlow {
    flow.scan(false, |failed, item| {
        if *failed {
            return future::ready(None);
        }
        *failed = item.is_err();
        future::ready(Some(item))
    })
    .boxed()
}
