//! Processor contract.

use crate::context::ExecutionContext;
use crate::error::GatewayResult;
use async_trait::async_trait;

/// A request/response transform wrapping every request of an API or of the
/// whole platform.  Processors never decide their own position: chain
/// factories do.
#[async_trait]
pub trait Processor: Send + Sync {
    fn id(&self) -> &str;

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()>;
}
