//! Transaction and request id correlation headers.

use async_trait::async_trait;
use portico_kernel::{ExecutionContext, GatewayResult, Processor};

/// Propagates the client's transaction id, or starts one from the request
/// id, and mirrors both ids on the request and the response.
pub struct TransactionProcessor {
    transaction_header: String,
    request_header: String,
}

impl TransactionProcessor {
    pub fn new(transaction_header: impl Into<String>, request_header: impl Into<String>) -> Self {
        Self {
            transaction_header: transaction_header.into(),
            request_header: request_header.into(),
        }
    }
}

#[async_trait]
impl Processor for TransactionProcessor {
    fn id(&self) -> &str {
        "transaction"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let request_id = ctx.request.id.clone();
        let transaction_id = ctx
            .request
            .headers
            .get(&self.transaction_header)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| request_id.clone());

        ctx.request.transaction_id = transaction_id.clone();
        ctx.metrics.transaction_id = transaction_id.clone();

        ctx.request.headers.set(&self.transaction_header, &transaction_id);
        ctx.request.headers.set(&self.request_header, &request_id);
        ctx.response.headers.set(&self.transaction_header, transaction_id);
        ctx.response.headers.set(&self.request_header, request_id);
        Ok(())
    }
}
