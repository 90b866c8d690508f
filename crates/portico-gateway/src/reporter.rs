//! Built-in metrics reporter.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use portico_kernel::{GatewayError, GatewayResult, Metrics, Reporter};
use tracing::info;

/// Publishes every metrics record as a structured `tracing` event under the
/// `portico::report` target.
#[derive(Debug, Default)]
pub struct LogReporter;

impl LogReporter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Reporter for LogReporter {
    fn id(&self) -> &str {
        "log"
    }

    async fn report(&self, metrics: &Metrics) -> GatewayResult<()> {
        let timestamp = i64::try_from(metrics.timestamp_ms)
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let record =
            serde_json::to_string(metrics).map_err(|e| GatewayError::Internal(e.to_string()))?;
        info!(
            target: "portico::report",
            timestamp = %timestamp,
            request_id = %metrics.request_id,
            api = metrics.api_id.as_deref().unwrap_or("-"),
            status = metrics.status,
            response_time_ms = metrics.gateway_response_time_ms,
            record = %record,
            "request reported"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_any_record() {
        let metrics = Metrics {
            timestamp_ms: 1_700_000_000_000,
            request_id: "r1".to_string(),
            status: 200,
            ..Metrics::default()
        };
        LogReporter::new().report(&metrics).await.unwrap();
        LogReporter::new().report(&Metrics::default()).await.unwrap();
    }
}
