//! API request/response logging.
//!
//! Captured entries are attached to the metrics record, so the reporter
//! publishes them together with the request metrics.

use async_trait::async_trait;
use portico_kernel::{ExecutionContext, GatewayResult, Log, LogEntry, Processor};
use tracing::{info, warn};

/// Body text truncated to at most `max` bytes, on a char boundary.
fn capture_body(body: &[u8], max: Option<usize>) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(body);
    let Some(max) = max.filter(|m| *m < text.len()) else {
        return Some(text.into_owned());
    };
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    Some(text[..end].to_string())
}

/// Captures the client request.
pub struct LogRequestProcessor {
    max_body_size: Option<usize>,
}

impl LogRequestProcessor {
    pub fn new(max_body_size: Option<usize>) -> Self {
        Self { max_body_size }
    }
}

#[async_trait]
impl Processor for LogRequestProcessor {
    fn id(&self) -> &str {
        "log-request"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        info!(
            request_id = %ctx.request.id,
            method = %ctx.request.method,
            path = %ctx.request.path,
            "Incoming request"
        );
        let entry = LogEntry {
            method: Some(ctx.request.method.as_str().to_string()),
            uri: Some(ctx.request.uri.clone()),
            status: None,
            headers: ctx.request.headers.clone(),
            body: capture_body(&ctx.request.body, self.max_body_size),
        };
        ctx.metrics.log = Some(Log {
            api_id: ctx.metrics.api_id.clone().unwrap_or_default(),
            request_id: ctx.request.id.clone(),
            timestamp_ms: ctx.metrics.timestamp_ms,
            client_request: Some(entry),
            client_response: None,
        });
        Ok(())
    }
}

/// Captures the response sent to the client.
pub struct LogResponseProcessor {
    max_body_size: Option<usize>,
}

impl LogResponseProcessor {
    pub fn new(max_body_size: Option<usize>) -> Self {
        Self { max_body_size }
    }
}

#[async_trait]
impl Processor for LogResponseProcessor {
    fn id(&self) -> &str {
        "log-response"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let status = ctx.response.status;
        if status >= 500 {
            warn!(request_id = %ctx.request.id, status, elapsed_ms = ctx.elapsed_ms(), "Request failed");
        } else {
            info!(request_id = %ctx.request.id, status, elapsed_ms = ctx.elapsed_ms(), "Request completed");
        }

        let entry = LogEntry {
            method: None,
            uri: None,
            status: Some(status),
            headers: ctx.response.headers.clone(),
            body: capture_body(&ctx.response.body, self.max_body_size),
        };
        match ctx.metrics.log.as_mut() {
            Some(log) => log.client_response = Some(entry),
            None => {
                ctx.metrics.log = Some(Log {
                    api_id: ctx.metrics.api_id.clone().unwrap_or_default(),
                    request_id: ctx.request.id.clone(),
                    timestamp_ms: ctx.metrics.timestamp_ms,
                    client_request: None,
                    client_response: Some(entry),
                });
            }
        }
        Ok(())
    }
}
