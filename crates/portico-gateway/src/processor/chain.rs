//! Sequential processor execution.

use portico_kernel::{ExecutionContext, ExecutionPhase, GatewayResult, Hook, Processor};
use std::sync::Arc;
use tracing::warn;

/// Ordered processors run one after the other; the first error stops the
/// chain.  The phase is only reported to hooks.
#[derive(Clone)]
pub struct ProcessorChain {
    id: String,
    phase: ExecutionPhase,
    processors: Vec<Arc<dyn Processor>>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl ProcessorChain {
    pub fn new(id: impl Into<String>, phase: ExecutionPhase, processors: Vec<Arc<dyn Processor>>) -> Self {
        Self {
            id: id.into(),
            phase,
            processors,
            hooks: Vec::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn Hook>>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Processor ids in execution order.
    pub fn processor_ids(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.id()).collect()
    }

    pub async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        for processor in &self.processors {
            for hook in &self.hooks {
                if let Err(err) = hook.pre(processor.id(), ctx, self.phase) {
                    warn!(hook = hook.id(), processor = processor.id(), error = %err, "pre hook failed");
                }
            }
            let result = processor.execute(ctx).await;
            for hook in &self.hooks {
                let outcome = match &result {
                    Ok(()) => hook.post(processor.id(), ctx, self.phase),
                    Err(err) => hook.error(processor.id(), ctx, self.phase, err),
                };
                if let Err(err) = outcome {
                    warn!(hook = hook.id(), processor = processor.id(), error = %err, "post hook failed");
                }
            }
            result?;
        }
        Ok(())
    }
}
