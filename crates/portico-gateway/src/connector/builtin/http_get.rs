//! `http-get` entrypoint: serves a batch of outgoing messages per request.

use super::parse_configuration;
use crate::accept;
use async_trait::async_trait;
use futures::StreamExt;
use portico_kernel::{
    ApiType, ConnectorKind, ConnectorMode, DeploymentContext, EntrypointConnector,
    EntrypointConnectorFactory, ExecutionContext, ExecutionFailure, GatewayError, GatewayResult,
    HttpMethod, ListenerType, Message, Qos,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const MODES: &[ConnectorMode] = &[ConnectorMode::Subscribe];
const JSON: &str = "application/json";
const TEXT: &str = "text/plain";

const ATTR_INTERNAL_CONTENT_TYPE: &str = "http-get.content-type";
const ATTR_INTERNAL_LIMIT_COUNT: &str = "http-get.limit-count";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Configuration {
    messages_limit_count: usize,
    messages_limit_duration_ms: u64,
    headers_in_payload: bool,
    metadata_in_payload: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            messages_limit_count: 500,
            messages_limit_duration_ms: 5_000,
            headers_in_payload: false,
            metadata_in_payload: false,
        }
    }
}

/// Collects response messages until the count or duration limit is hit and
/// writes them as one body, JSON (`{"items": [...]}`) or plain text.
pub struct HttpGetEntrypoint {
    configuration: Configuration,
    qos: Qos,
}

impl HttpGetEntrypoint {
    pub fn qos(&self) -> Qos {
        self.qos
    }

    /// `application/json` for a wildcard, `text/plain` for no preference,
    /// `None` when only unsupported types are accepted.
    fn select_content_type(accept_values: &[&str]) -> Option<&'static str> {
        let ranked = accept::media_types(accept_values.iter().copied());
        if ranked.is_empty() {
            return Some(TEXT);
        }
        ranked.iter().find_map(|media| match media.as_str() {
            JSON | "*/*" | "application/*" => Some(JSON),
            TEXT | "text/*" => Some(TEXT),
            _ => None,
        })
    }

    fn render(&self, content_type: &str, messages: &[Message]) -> String {
        if content_type == JSON {
            let items: Vec<Value> = messages.iter().map(|m| self.json_item(m)).collect();
            let mut body = json!({ "items": items });
            if let Some(last) = messages.last() {
                body["pagination"] = json!({ "nextCursor": last.id });
            }
            body.to_string()
        } else {
            let mut body = String::from("items\n");
            for message in messages {
                body.push_str("\nitem\n");
                body.push_str(&format!("id: {}\n", message.id));
                body.push_str(&format!("content: {}\n", message.content_str()));
            }
            body
        }
    }

    fn json_item(&self, message: &Message) -> Value {
        let content = message.content_str();
        let mut item = json!({
            "id": message.id,
            "content": serde_json::from_str::<Value>(&content).unwrap_or(Value::String(content)),
        });
        if self.configuration.headers_in_payload {
            item["headers"] = message.headers.to_json();
        }
        if self.configuration.metadata_in_payload {
            item["metadata"] = json!(message.metadata);
        }
        item
    }
}

#[async_trait]
impl EntrypointConnector for HttpGetEntrypoint {
    fn id(&self) -> &str {
        "http-get"
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
        ctx.request.method == HttpMethod::Get
    }

    async fn handle_request(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let accept_values: Vec<&str> = ctx.request.headers.get_all("accept");
        let Some(content_type) = Self::select_content_type(&accept_values) else {
            return Err(GatewayError::failure(
                ExecutionFailure::new(400).message(format!("Unsupported accept header: {accept_values:?}")),
            ));
        };
        let requested = ctx
            .request
            .parameter("limit")
            .and_then(|l| l.parse::<usize>().ok());
        let limit = requested
            .map(|l| l.min(self.configuration.messages_limit_count))
            .unwrap_or(self.configuration.messages_limit_count);

        ctx.set_internal_attr(ATTR_INTERNAL_CONTENT_TYPE, &content_type);
        ctx.set_internal_attr(ATTR_INTERNAL_LIMIT_COUNT, &limit);
        Ok(())
    }

    async fn handle_response(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let content_type = ctx
            .get_internal_attr::<String>(ATTR_INTERNAL_CONTENT_TYPE)
            .unwrap_or_else(|| TEXT.to_string());
        let limit = ctx
            .get_internal_attr::<usize>(ATTR_INTERNAL_LIMIT_COUNT)
            .unwrap_or(self.configuration.messages_limit_count);

        let mut messages = Vec::new();
        if let Some(flow) = ctx.response.messages.take() {
            let deadline = Box::pin(tokio::time::sleep(Duration::from_millis(
                self.configuration.messages_limit_duration_ms,
            )));
            let mut flow = flow.take(limit).take_until(deadline);
            while let Some(item) = flow.next().await {
                messages.push(item?);
            }
        }

        ctx.response.headers.set("Content-Type", content_type.as_str());
        let body = self.render(&content_type, &messages);
        ctx.response.set_body(body);
        Ok(())
    }
}

pub struct HttpGetEntrypointFactory;

impl EntrypointConnectorFactory for HttpGetEntrypointFactory {
    fn id(&self) -> &str {
        "http-get"
    }

    fn supported_api_type(&self) -> ApiType {
        ApiType::Message
    }

    fn create(
        &self,
        configuration: &Value,
        qos: Option<Qos>,
        _deployment: &DeploymentContext,
    ) -> GatewayResult<Arc<dyn EntrypointConnector>> {
        Ok(Arc::new(HttpGetEntrypoint {
            configuration: parse_configuration("http-get", configuration)?,
            qos: qos.unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use portico_kernel::{ApiDefinition, Request};

    fn connector(configuration: Value) -> Arc<dyn EntrypointConnector> {
        HttpGetEntrypointFactory
            .create(
                &configuration,
                Some(Qos::Auto),
                &DeploymentContext::new(Arc::new(ApiDefinition::new("api", "Api", ApiType::Message))),
            )
            .unwrap()
    }

    fn ctx(uri: &str, accept: Option<&str>) -> ExecutionContext {
        let mut request = Request::new("r1", HttpMethod::Get, uri);
        if let Some(accept) = accept {
            request = request.with_header("Accept", accept);
        }
        ExecutionContext::with_messages(request)
    }

    #[test]
    fn content_type_selection() {
        assert_eq!(HttpGetEntrypoint::select_content_type(&[]), Some(TEXT));
        assert_eq!(HttpGetEntrypoint::select_content_type(&["*/*"]), Some(JSON));
        assert_eq!(
            HttpGetEntrypoint::select_content_type(&["text/plain;q=0.4, application/json"]),
            Some(JSON)
        );
        assert_eq!(HttpGetEntrypoint::select_content_type(&["image/png"]), None);
    }

    #[tokio::test]
    async fn unsupported_accept_is_rejected() {
        let connector = connector(Value::Null);
        let err = connector
            .handle_request(&mut ctx("/feed", Some("image/png")))
            .await
            .unwrap_err();
        assert_eq!(err.execution_failure().map(|f| f.status_code), Some(400));
    }

    #[tokio::test]
    async fn messages_are_batched_up_to_the_limit() {
        let connector = connector(json!({ "messagesLimitCount": 10 }));
        let mut ctx = ctx("/feed?limit=2", Some("application/json"));
        connector.handle_request(&mut ctx).await.unwrap();

        ctx.response.messages = Some(
            stream::iter(vec![
                Ok(Message::new(r#"{"n":1}"#).with_id("1")),
                Ok(Message::new("two").with_id("2")),
                Ok(Message::new("three").with_id("3")),
            ])
            .boxed(),
        );
        connector.handle_response(&mut ctx).await.unwrap();

        let body: Value = serde_json::from_slice(&ctx.response.body).unwrap();
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
        assert_eq!(body["items"][0]["content"]["n"], 1);
        assert_eq!(body["items"][1]["content"], "two");
        assert_eq!(body["pagination"]["nextCursor"], "2");
        assert_eq!(ctx.response.headers.get("content-type"), Some(JSON));
    }

    #[tokio::test(start_paused = true)]
    async fn an_idle_flow_ends_at_the_duration_limit() {
        let connector = connector(json!({ "messagesLimitDurationMs": 100 }));
        let mut ctx = ctx("/feed", None);
        connector.handle_request(&mut ctx).await.unwrap();
        ctx.response.messages = Some(stream::pending().boxed());

        connector.handle_response(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.headers.get("content-type"), Some(TEXT));
        assert_eq!(String::from_utf8_lossy(&ctx.response.body), "items\n");
    }
}
