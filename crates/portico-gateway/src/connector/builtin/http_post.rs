//! `http-post` entrypoint: publishes the request body as one message.

use super::parse_configuration;
use async_trait::async_trait;
use futures::{StreamExt, stream};
use portico_kernel::{
    ApiType, ConnectorKind, ConnectorMode, DeploymentContext, EntrypointConnector,
    EntrypointConnectorFactory, ExecutionContext, GatewayResult, HttpMethod, ListenerType,
    Message, Qos,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const MODES: &[ConnectorMode] = &[ConnectorMode::Publish];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Configuration {
    request_headers_to_message: bool,
}

pub struct HttpPostEntrypoint {
    configuration: Configuration,
}

#[async_trait]
impl EntrypointConnector for HttpPostEntrypoint {
    fn id(&self) -> &str {
        "http-post"
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Message
    }

    fn supported_listener_type(&self) -> ListenerType {
        ListenerType::Http
    }

    fn supported_api_type(&self) -> ApiType {
        ApiType::Message
    }

    fn supported_modes(&self) -> &[ConnectorMode] {
        MODES
    }

    fn matches(&self, ctx: &ExecutionContext) -> bool {
        ctx.request.method == HttpMethod::Post
    }

    async fn handle_request(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let mut message = Message::new(ctx.request.body.clone());
        if self.configuration.request_headers_to_message {
            message.headers = ctx.request.headers.clone();
        }
        ctx.request.messages = Some(stream::once(async move { Ok(message) }).boxed());
        Ok(())
    }

    async fn handle_response(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        if ctx.response.status == 200 {
            ctx.response.status = 202;
        }
        Ok(())
    }
}

pub struct HttpPostEntrypointFactory;

impl EntrypointConnectorFactory for HttpPostEntrypointFactory {
    fn id(&self) -> &str {
        "http-post"
    }

    fn supported_api_type(&self) -> ApiType {
        ApiType::Message
    }

    fn create(
        &self,
        configuration: &Value,
        _qos: Option<Qos>,
        _deployment: &DeploymentContext,
    ) -> GatewayResult<Arc<dyn EntrypointConnector>> {
        Ok(Arc::new(HttpPostEntrypoint {
            configuration: parse_configuration("http-post", configuration)?,
        }))
    }
}
