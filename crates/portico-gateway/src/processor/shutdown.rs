use crate::node::Node;
use async_trait::async_trait;
use portico_kernel::{ExecutionContext, GatewayResult, Processor};
use std::sync::Arc;

/// Adds `Connection: close` while the node shuts down.
pub struct ShutdownProcessor {
    node: Arc<Node>,
}

impl ShutdownProcessor {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl Processor for ShutdownProcessor {
    fn id(&self) -> &str {
        "shutdown"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        if self.node.is_shutting_down() {
            ctx.response.headers.set("Connection", "close");
        }
        Ok(())
    }
}
