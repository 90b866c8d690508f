//! Failure rendering with API response templates.

use crate::accept;
use crate::el;
use async_trait::async_trait;
use portico_kernel::context::ATTR_INTERNAL_EXECUTION_FAILURE;
use portico_kernel::{
    ApiDefinition, ExecutionContext, ExecutionFailure, GatewayResult, Processor, ResponseTemplate,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::warn;

/// Template key used when the failure key has no template.
pub const DEFAULT_TEMPLATE_KEY: &str = "DEFAULT";
/// Content type entry matching any `Accept`.
pub const WILDCARD_CONTENT_TYPE: &str = "*";

const JSON: &str = "application/json";
const TEXT: &str = "text/plain";

/// Writes the failure stored under the execution-failure attribute into the
/// response.
///
/// Templates are looked up by failure key, then `DEFAULT`; within a key the
/// content type is chosen by `Accept` in quality order, then `*`.  Without a
/// template the failure's own status and message are rendered.
pub struct ResponseTemplateProcessor {
    templates: HashMap<String, HashMap<String, ResponseTemplate>>,
}

impl ResponseTemplateProcessor {
    pub fn new(api: &ApiDefinition) -> Self {
        Self {
            templates: api.response_templates.clone(),
        }
    }

    fn select<'a>(&'a self, key: Option<&str>, accepted: &[String]) -> Option<(&'a str, &'a ResponseTemplate)> {
        let keys = key.into_iter().chain(std::iter::once(DEFAULT_TEMPLATE_KEY));
        keys.filter_map(|k| self.templates.get(k)).find_map(|by_type| {
            accepted
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(WILDCARD_CONTENT_TYPE))
                .find_map(|media| by_type.get_key_value(media))
                .map(|(media, template)| (media.as_str(), template))
        })
    }
}

#[async_trait]
impl Processor for ResponseTemplateProcessor {
    fn id(&self) -> &str {
        "response-template"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let failure: ExecutionFailure = ctx
            .get_internal_attr(ATTR_INTERNAL_EXECUTION_FAILURE)
            .unwrap_or_else(|| ExecutionFailure::new(500));
        ctx.metrics.error_key = failure.key.clone();
        ctx.metrics.error_message = failure.message.clone();

        let accepted = accept::media_types(ctx.request.headers.get_all("accept"));
        ctx.response.messages = None;
        ctx.response.reason = None;

        match self.select(failure.key.as_deref(), &accepted) {
            Some((media, template)) => {
                let mut variables = ctx.template_variables();
                if let Value::Object(root) = &mut variables {
                    root.insert("error".to_string(), error_variables(&failure));
                }
                ctx.response.status = template.status;
                for (name, value) in &template.headers {
                    ctx.response.headers.set(name, value);
                }
                let body = template.body.as_deref().unwrap_or_default();
                let rendered = el::render(body, &variables).unwrap_or_else(|err| {
                    warn!(request_id = %ctx.request.id, error = %err, "response template rendering failed");
                    body.to_string()
                });
                if media != WILDCARD_CONTENT_TYPE && !ctx.response.headers.contains("content-type") {
                    ctx.response.headers.set("Content-Type", media);
                }
                ctx.response.set_body(rendered);
            }
            None => render_failure(ctx, &failure, &accepted),
        }
        Ok(())
    }
}

fn error_variables(failure: &ExecutionFailure) -> Value {
    json!({
        "key": failure.key,
        "message": failure.message,
        "statusCode": failure.status_code,
        "parameters": failure.parameters,
    })
}

fn prefers_json(accepted: &[String]) -> bool {
    accepted.is_empty()
        || accepted
            .iter()
            .any(|m| m == JSON || m == "*/*" || m == "application/*" || m.ends_with("+json"))
}

fn render_failure(ctx: &mut ExecutionContext, failure: &ExecutionFailure, accepted: &[String]) {
    ctx.response.status = failure.status_code;
    let message = failure.message.clone().unwrap_or_default();
    let (content_type, body) = match &failure.content_type {
        Some(content_type) => (content_type.clone(), message),
        None if prefers_json(accepted) => (
            JSON.to_string(),
            json!({ "message": message, "http_status_code": failure.status_code }).to_string(),
        ),
        None => (TEXT.to_string(), message),
    };
    ctx.response.headers.set("Content-Type", content_type);
    ctx.response.set_body(body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_kernel::{ApiType, HttpMethod, Request};

    fn template(status: u16, body: &str) -> ResponseTemplate {
        ResponseTemplate {
            status,
            body: Some(body.to_string()),
            headers: HashMap::new(),
            propagate_error_key_to_logs: false,
        }
    }

    fn failed(accept: Option<&str>, failure: ExecutionFailure) -> ExecutionContext {
        let mut request = Request::new("r1", HttpMethod::Get, "/");
        if let Some(accept) = accept {
            request = request.with_header("Accept", accept);
        }
        let mut ctx = ExecutionContext::new(request);
        ctx.set_internal_attr(ATTR_INTERNAL_EXECUTION_FAILURE, &failure);
        ctx
    }

    fn api() -> ApiDefinition {
        ApiDefinition::new("api", "Api", ApiType::Proxy)
            .with_response_template("API_KEY_MISSING", "application/json", template(403, "{\"error\":\"{#error.key}\"}"))
            .with_response_template("API_KEY_MISSING", "text/plain", template(403, "missing key"))
            .with_response_template("API_KEY_MISSING", "*", template(418, "teapot"))
            .with_response_template("DEFAULT", "*", template(503, "default: {#error.message}"))
    }

    #[tokio::test]
    async fn template_is_chosen_by_accept_quality() {
        let processor = ResponseTemplateProcessor::new(&api());
        let failure = ExecutionFailure::new(401).key("API_KEY_MISSING").message("Unauthorized");

        let mut ctx = failed(Some("application/json;q=0.5, text/plain"), failure.clone());
        processor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.status, 403);
        assert_eq!(ctx.response.body, "missing key");
        assert_eq!(ctx.response.headers.get("content-type"), Some("text/plain"));

        let mut ctx = failed(Some("application/json"), failure.clone());
        processor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.body, "{\"error\":\"API_KEY_MISSING\"}");

        let mut ctx = failed(Some("application/xml"), failure);
        processor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.status, 418);
        assert!(!ctx.response.headers.contains("content-type"));
    }

    #[tokio::test]
    async fn unknown_key_falls_back_to_default_template() {
        let processor = ResponseTemplateProcessor::new(&api());
        let mut ctx = failed(None, ExecutionFailure::new(500).key("OTHER").message("boom"));
        processor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.status, 503);
        assert_eq!(ctx.response.body, "default: boom");
        assert_eq!(ctx.metrics.error_key.as_deref(), Some("OTHER"));
        assert_eq!(ctx.metrics.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn failure_is_rendered_without_templates() {
        let processor = ResponseTemplateProcessor::new(&ApiDefinition::new("api", "Api", ApiType::Proxy));

        let mut ctx = failed(None, ExecutionFailure::new(401).message("Unauthorized"));
        processor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.status, 401);
        assert_eq!(ctx.response.headers.get("content-type"), Some("application/json"));
        let body: Value = serde_json::from_slice(&ctx.response.body).unwrap();
        assert_eq!(body, json!({ "message": "Unauthorized", "http_status_code": 401 }));

        let mut ctx = failed(Some("text/html"), ExecutionFailure::new(404).message("Not here"));
        processor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.headers.get("content-type"), Some("text/plain"));
        assert_eq!(ctx.response.body, "Not here");

        let mut ctx = failed(
            None,
            ExecutionFailure::new(400).message("<error/>").content_type("application/xml"),
        );
        processor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.headers.get("content-type"), Some("application/xml"));
        assert_eq!(ctx.response.body, "<error/>");
    }
}
