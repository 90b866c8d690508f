//! `mock` endpoint: canned proxy responses and generated message streams.

use super::parse_configuration;
use async_trait::async_trait;
use futures::StreamExt;
use portico_kernel::context::ATTR_INTERNAL_ENTRYPOINT_MODES;
use portico_kernel::{
    ApiType, ConnectorMode, DeploymentContext, EndpointConnector, EndpointConnectorFactory,
    ExecutionContext, GatewayResult, Message,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Capacity of the channel between the generator task and the consumer.
const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Configuration {
    status: u16,
    content: String,
    headers: HashMap<String, String>,
    message_content: String,
    message_count: Option<u64>,
    message_interval_ms: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            status: 200,
            content: "mock".to_string(),
            headers: HashMap::new(),
            message_content: "mock message".to_string(),
            message_count: None,
            message_interval_ms: 1_000,
        }
    }
}

/// For proxy APIs writes the configured status, headers and content.  For
/// message APIs drains published messages and, when the entrypoint
/// subscribes, generates `messageCount` messages (unbounded if unset) every
/// `messageIntervalMs`.
pub struct MockEndpoint {
    api_type: ApiType,
    configuration: Configuration,
}

impl MockEndpoint {
    async fn drain_published(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        if let Some(mut flow) = ctx.request.messages.take() {
            let mut received = 0usize;
            while let Some(message) = flow.next().await {
                message?;
                received += 1;
            }
            debug!(received, "mock endpoint consumed published messages");
        }
        Ok(())
    }

    fn subscribe(&self, ctx: &mut ExecutionContext) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let content = self.configuration.message_content.clone();
        let count = self.configuration.message_count;
        let interval = Duration::from_millis(self.configuration.message_interval_ms);

        tokio::spawn(async move {
            let mut sent = 0u64;
            while count.is_none_or(|c| sent < c) {
                if sent > 0 && !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
                let message = Message::new(content.clone()).with_id(sent.to_string());
                if tx.send(Ok(message)).await.is_err() {
                    break;
                }
                sent += 1;
            }
        });
        ctx.response.messages = Some(ReceiverStream::new(rx).boxed());
    }
}

#[async_trait]
impl EndpointConnector for MockEndpoint {
    fn id(&self) -> &str {
        "mock"
    }

    fn supported_api_type(&self) -> ApiType {
        self.api_type
    }

    fn supported_modes(&self) -> &[ConnectorMode] {
        match self.api_type {
            ApiType::Proxy => &[ConnectorMode::RequestResponse],
            ApiType::Message => &[ConnectorMode::Publish, ConnectorMode::Subscribe],
        }
    }

    async fn connect(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        ctx.metrics.endpoint = Some("mock".to_string());
        match self.api_type {
            ApiType::Proxy => {
                ctx.response.status = self.configuration.status;
                for (name, value) in &self.configuration.headers {
                    ctx.response.headers.set(name.as_str(), value.as_str());
                }
                ctx.response.set_body(self.configuration.content.clone());
            }
            ApiType::Message => {
                self.drain_published(ctx).await?;
                let modes: Vec<ConnectorMode> = ctx
                    .get_internal_attr(ATTR_INTERNAL_ENTRYPOINT_MODES)
                    .unwrap_or_default();
                if modes.contains(&ConnectorMode::Subscribe) {
                    self.subscribe(ctx);
                }
            }
        }
        ctx.metrics.endpoint_response_time_ms = Some(0);
        Ok(())
    }
}

pub struct MockEndpointFactory;

impl EndpointConnectorFactory for MockEndpointFactory {
    fn id(&self) -> &str {
        "mock"
    }

    /// Serves both API types; the deployment decides which behavior applies.
    fn supported_api_type(&self) -> ApiType {
        ApiType::Message
    }

    fn create(
        &self,
        configuration: &Value,
        _shared_configuration: &Value,
        deployment: &DeploymentContext,
    ) -> GatewayResult<Arc<dyn EndpointConnector>> {
        Ok(Arc::new(MockEndpoint {
            api_type: deployment.api.api_type,
            configuration: parse_configuration("mock", configuration)?,
        }))
    }
}
