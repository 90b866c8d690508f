//! Reporting and alerting sinks.

use crate::error::GatewayResult;
use crate::metrics::Metrics;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Receives the metrics record of every finished request.
#[async_trait]
pub trait Reporter: Send + Sync {
    fn id(&self) -> &str;

    async fn report(&self, metrics: &Metrics) -> GatewayResult<()>;
}

/// Event emitted to the alert engine after a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub kind: String,
    pub timestamp_ms: u64,
    pub properties: HashMap<String, Value>,
}

impl AlertEvent {
    pub fn new(kind: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            kind: kind.into(),
            timestamp_ms,
            properties: HashMap::new(),
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Alert engine connection.
pub trait AlertEventProducer: Send + Sync {
    /// `true` when no alert trigger is registered, so events are pointless.
    fn is_empty(&self) -> bool;

    fn send(&self, event: AlertEvent);
}
