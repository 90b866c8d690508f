//! Per-request execution context.
//!
//! One [`ExecutionContext`] is created when a request enters the gateway and
//! dropped once its response is written.  It owns the request and response
//! handles, the public attribute map policies can read and write, internal
//! attributes reserved to the gateway, the metrics record and the template
//! variable providers used by the expression language.

use crate::definition::ListenerType;
use crate::http::{Request, Response};
use crate::message::{Message, MessageFlow};
use crate::metrics::Metrics;
use crate::phase::ExecutionPhase;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Attribute names
// ─────────────────────────────────────────────────────────────────────────────

/// Internal: listener type the transport accepted the request on.
pub const ATTR_INTERNAL_LISTENER_TYPE: &str = "listener-type";
/// Internal: ids of the plans whose selection rule accepted the request.
pub const ATTR_INTERNAL_ELIGIBLE_PLANS: &str = "eligible-plans";
/// Internal: failure being rendered by the error chain.
pub const ATTR_INTERNAL_EXECUTION_FAILURE: &str = "execution-failure";
/// Internal: connector modes of the resolved entrypoint.
pub const ATTR_INTERNAL_ENTRYPOINT_MODES: &str = "entrypoint-modes";

pub const ATTR_API: &str = "api";
pub const ATTR_API_NAME: &str = "api.name";
pub const ATTR_PLAN: &str = "plan";
pub const ATTR_CONTEXT_PATH: &str = "context-path";
pub const ATTR_API_KEY: &str = "api-key";
/// Name of the endpoint group the endpoint resolver should target.
pub const ATTR_REQUEST_ENDPOINT: &str = "request.endpoint";

// ─────────────────────────────────────────────────────────────────────────────
// Template variables
// ─────────────────────────────────────────────────────────────────────────────

/// Contributes root variables (e.g. `#api`) to the expression language.
pub trait TemplateVariableProvider: Send + Sync {
    fn provide(&self, variables: &mut Map<String, Value>);
}

/// Whether the context can carry message flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Http,
    Message,
}

// ─────────────────────────────────────────────────────────────────────────────
// ExecutionContext
// ─────────────────────────────────────────────────────────────────────────────

pub struct ExecutionContext {
    pub request: Request,
    pub response: Response,
    pub metrics: Metrics,
    kind: ContextKind,
    attributes: HashMap<String, Value>,
    internal_attributes: HashMap<String, Value>,
    providers: Vec<Arc<dyn TemplateVariableProvider>>,
    started_at: Instant,
}

impl ExecutionContext {
    /// Create a plain request/response context.
    pub fn new(request: Request) -> Self {
        let metrics = Metrics {
            timestamp_ms: now_ms(),
            request_id: request.id.clone(),
            http_method: request.method.as_str().to_string(),
            uri: request.uri.clone(),
            path_info: request.path_info.clone(),
            host: request.host.clone(),
            local_address: request.local_address.clone(),
            remote_address: request.remote_address.clone(),
            user_agent: request.headers.get("user-agent").map(str::to_string),
            request_content_length: request.body.len() as u64,
            ..Metrics::default()
        };
        Self {
            request,
            response: Response::new(),
            metrics,
            kind: ContextKind::Http,
            attributes: HashMap::new(),
            internal_attributes: HashMap::new(),
            providers: Vec::new(),
            started_at: Instant::now(),
        }
    }

    /// Create a context able to carry message flows.
    pub fn with_messages(request: Request) -> Self {
        let mut ctx = Self::new(request);
        ctx.kind = ContextKind::Message;
        ctx
    }

    /// Upgrade a plain context once the API it targets is known to be a
    /// message API.
    pub fn enable_message_flow(&mut self) {
        self.kind = ContextKind::Message;
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn supports_messages(&self) -> bool {
        self.kind == ContextKind::Message
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Milliseconds spent since the request entered the gateway.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    // ── Attributes ──────────────────────────────────────────────────────────

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Deserialize an attribute into `T`.
    pub fn get_attr<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Store an attribute; values that fail to serialize are ignored.
    pub fn set_attr<T: Serialize>(&mut self, key: impl Into<String>, value: &T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.attributes.insert(key.into(), v);
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    pub fn get_internal_attr<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.internal_attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_internal_attr<T: Serialize>(&mut self, key: impl Into<String>, value: &T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.internal_attributes.insert(key.into(), v);
        }
    }

    pub fn remove_internal_attr(&mut self, key: &str) -> Option<Value> {
        self.internal_attributes.remove(key)
    }

    /// Listener type recorded by the transport, if any.
    pub fn listener_type(&self) -> Option<ListenerType> {
        self.internal_attributes
            .get(ATTR_INTERNAL_LISTENER_TYPE)
            .and_then(Value::as_str)
            .and_then(ListenerType::from_label)
    }

    pub fn set_listener_type(&mut self, listener_type: ListenerType) {
        self.internal_attributes.insert(
            ATTR_INTERNAL_LISTENER_TYPE.to_string(),
            Value::String(listener_type.as_str().to_string()),
        );
    }

    // ── Message flows ───────────────────────────────────────────────────────

    /// Message flow slot the given async phase operates on.
    pub fn messages_mut(&mut self, phase: ExecutionPhase) -> &mut Option<MessageFlow> {
        if phase.is_request() {
            &mut self.request.messages
        } else {
            &mut self.response.messages
        }
    }

    // ── Expression language ─────────────────────────────────────────────────

    pub fn add_template_variable_provider(&mut self, provider: Arc<dyn TemplateVariableProvider>) {
        self.providers.push(provider);
    }

    /// JSON view of the context: `request`, `response`, `context` plus every
    /// provider's contributions.
    pub fn template_variables(&self) -> Value {
        let mut root = Map::new();
        root.insert("request".to_string(), self.request.to_json());
        root.insert("response".to_string(), self.response.to_json());
        let attributes: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut context = Map::new();
        context.insert("attributes".to_string(), Value::Object(attributes));
        root.insert("context".to_string(), Value::Object(context));
        for provider in &self.providers {
            provider.provide(&mut root);
        }
        Value::Object(root)
    }

    /// Snapshot handed to message-level policy operations, which outlive the
    /// mutable borrow of the context.
    pub fn message_scope(&self) -> MessageScope {
        MessageScope {
            request_id: self.request.id.clone(),
            api_id: self.metrics.api_id.clone(),
            variables: Arc::new(self.template_variables()),
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("kind", &self.kind)
            .field("request", &self.request)
            .field("response", &self.response)
            .field("attributes", &self.attributes)
            .field("internal_attributes", &self.internal_attributes)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MessageScope
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only view of a request used while its messages flow.
#[derive(Debug, Clone)]
pub struct MessageScope {
    pub request_id: String,
    pub api_id: Option<String>,
    pub variables: Arc<Value>,
}

impl MessageScope {
    /// Template variables with `message` bound to the given message.
    pub fn variables_for(&self, message: &Message) -> Value {
        let mut variables = (*self.variables).clone();
        if let Value::Object(root) = &mut variables {
            root.insert("message".to_string(), message.to_json());
        }
        variables
    }
}

pub(crate) fn now_ms() -> u64 {
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            Request::new("req-1", HttpMethod::Get, "/echo?x=1").with_header("X-Foo", "bar"),
        )
    }

    #[test]
    fn attributes_round_trip_through_json() {
        let mut c = ctx();
        c.set_attr("count", &3u32);
        assert_eq!(c.get_attr::<u32>("count"), Some(3));
        assert_eq!(c.get_attr::<String>("count"), None);
        assert!(c.remove_attr("count").is_some());
    }

    #[test]
    fn listener_type_is_an_internal_attribute() {
        let mut c = ctx();
        assert_eq!(c.listener_type(), None);
        c.set_listener_type(ListenerType::Http);
        assert_eq!(c.listener_type(), Some(ListenerType::Http));
        assert!(c.attribute(ATTR_INTERNAL_LISTENER_TYPE).is_none());
    }

    #[test]
    fn template_variables_expose_request_and_providers() {
        struct Api;
        impl TemplateVariableProvider for Api {
            fn provide(&self, variables: &mut Map<String, Value>) {
                variables.insert("api".into(), serde_json::json!({ "id": "api-1" }));
            }
        }

        let mut c = ctx();
        c.set_attr("user", &"alice");
        c.add_template_variable_provider(Arc::new(Api));
        let vars = c.template_variables();
        assert_eq!(vars["request"]["headers"]["x-foo"][0], "bar");
        assert_eq!(vars["request"]["params"]["x"][0], "1");
        assert_eq!(vars["context"]["attributes"]["user"], "alice");
        assert_eq!(vars["api"]["id"], "api-1");
    }

    #[test]
    fn plain_context_does_not_carry_messages() {
        let mut c = ctx();
        assert!(!c.supports_messages());
        c.enable_message_flow();
        assert!(c.supports_messages());
    }
}
