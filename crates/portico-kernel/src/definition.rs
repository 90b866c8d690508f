//! API definition model.
//!
//! An [`ApiDefinition`] is the immutable, per-deployment snapshot the gateway
//! executes.  It is created when an API is deployed, replaced wholesale on
//! redeploy and dropped on undeploy; every in-flight request of that API
//! shares it read-only behind an `Arc`.

use crate::error::DefinitionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

// ─────────────────────────────────────────────────────────────────────────────
// Enumerations
// ─────────────────────────────────────────────────────────────────────────────

/// Execution style of an API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    /// Synchronous request/response proxying.
    #[default]
    Proxy,
    /// Asynchronous message APIs (publish/subscribe through message flows).
    Message,
}

/// Ingress binding type of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerType {
    Http,
    Tcp,
    Subscription,
}

impl ListenerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerType::Http => "http",
            ListenerType::Tcp => "tcp",
            ListenerType::Subscription => "subscription",
        }
    }

    /// Parse the lowercase label written by [`as_str`](Self::as_str).
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "http" => Some(ListenerType::Http),
            "tcp" => Some(ListenerType::Tcp),
            "subscription" => Some(ListenerType::Subscription),
            _ => None,
        }
    }
}

/// Delivery guarantee requested from a message entrypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Qos {
    None,
    #[default]
    Auto,
    AtMostOnce,
    AtLeastOnce,
}

// ─────────────────────────────────────────────────────────────────────────────
// Listeners & entrypoints
// ─────────────────────────────────────────────────────────────────────────────

/// One entrypoint declared on a listener.  `configuration` is opaque to the
/// gateway and handed verbatim to the connector factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrypoint {
    #[serde(rename = "type")]
    pub entrypoint_type: String,
    #[serde(default)]
    pub qos: Option<Qos>,
    #[serde(default)]
    pub configuration: Value,
}

impl Entrypoint {
    pub fn new(entrypoint_type: impl Into<String>) -> Self {
        Self {
            entrypoint_type: entrypoint_type.into(),
            qos: None,
            configuration: Value::Null,
        }
    }

    /// Builder: attach the opaque configuration.
    pub fn with_configuration(mut self, configuration: Value) -> Self {
        self.configuration = configuration;
        self
    }

    /// Builder: request a delivery guarantee.
    pub fn with_qos(mut self, qos: Qos) -> Self {
        self.qos = Some(qos);
        self
    }
}

/// Cross-origin settings of an HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    pub enabled: bool,
    /// Allowed origins; `*` allows any origin.
    pub allow_origin: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    /// Preflight cache duration in seconds; negative disables the header.
    pub max_age: i64,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_origin: vec!["*".to_string()],
            allow_methods: Vec::new(),
            allow_headers: Vec::new(),
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age: -1,
        }
    }
}

impl CorsSettings {
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allow_origin
            .iter()
            .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(origin))
    }
}

/// Declared ingress binding of an API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listener {
    #[serde(rename = "type")]
    pub listener_type: ListenerType,
    /// Context paths served by an HTTP listener.
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub entrypoints: Vec<Entrypoint>,
    #[serde(default)]
    pub cors: Option<CorsSettings>,
    /// Path templates (`/products/:id`) recorded into metrics.
    #[serde(default)]
    pub path_mappings: Vec<String>,
}

impl Listener {
    pub fn new(listener_type: ListenerType) -> Self {
        Self {
            listener_type,
            paths: Vec::new(),
            entrypoints: Vec::new(),
            cors: None,
            path_mappings: Vec::new(),
        }
    }

    /// Shortcut for an HTTP listener bound to one context path.
    pub fn http(path: impl Into<String>) -> Self {
        Self::new(ListenerType::Http).with_path(path)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn with_entrypoint(mut self, entrypoint: Entrypoint) -> Self {
        self.entrypoints.push(entrypoint);
        self
    }

    pub fn with_cors(mut self, cors: CorsSettings) -> Self {
        self.cors = Some(cors);
        self
    }

    pub fn with_path_mapping(mut self, mapping: impl Into<String>) -> Self {
        self.path_mappings.push(mapping.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoints
// ─────────────────────────────────────────────────────────────────────────────

/// One backend target inside an endpoint group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    #[serde(default)]
    pub configuration: Value,
}

/// Named set of backend targets sharing a connector type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub endpoint_type: String,
    #[serde(default)]
    pub shared_configuration: Value,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl EndpointGroup {
    pub fn new(name: impl Into<String>, endpoint_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint_type: endpoint_type.into(),
            shared_configuration: Value::Null,
            endpoints: Vec::new(),
        }
    }

    pub fn with_endpoint(mut self, name: impl Into<String>, configuration: Value) -> Self {
        self.endpoints.push(Endpoint {
            name: name.into(),
            configuration,
        });
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flows, steps & plans
// ─────────────────────────────────────────────────────────────────────────────

fn enabled_by_default() -> bool {
    true
}

/// A flow step: associates a policy manifest with its configuration and an
/// optional guard condition.  Its position in the flow is its order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub name: String,
    pub policy: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default)]
    pub condition: Option<String>,
}

impl Step {
    pub fn new(policy: impl Into<String>) -> Self {
        let policy = policy.into();
        Self {
            name: policy.clone(),
            policy,
            enabled: true,
            configuration: Value::Null,
            condition: None,
        }
    }

    pub fn with_configuration(mut self, configuration: Value) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Request selector of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSelector {
    /// Path prefix, relative to the context path.
    pub path: String,
    /// Upper-case methods; empty accepts every method.
    pub methods: Vec<String>,
}

impl Default for FlowSelector {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            methods: Vec::new(),
        }
    }
}

/// Ordered, conditionally included set of policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    #[serde(default)]
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub selector: FlowSelector,
    #[serde(default)]
    pub request: Vec<Step>,
    #[serde(default)]
    pub response: Vec<Step>,
    /// Message-phase steps applied to incoming messages.
    #[serde(default)]
    pub publish: Vec<Step>,
    /// Message-phase steps applied to outgoing messages.
    #[serde(default)]
    pub subscribe: Vec<Step>,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            selector: FlowSelector::default(),
            request: Vec::new(),
            response: Vec::new(),
            publish: Vec::new(),
            subscribe: Vec::new(),
        }
    }

    pub fn with_selector(mut self, path: impl Into<String>, methods: Vec<String>) -> Self {
        self.selector = FlowSelector {
            path: path.into(),
            methods,
        };
        self
    }

    pub fn on_request(mut self, step: Step) -> Self {
        self.request.push(step);
        self
    }

    pub fn on_response(mut self, step: Step) -> Self {
        self.response.push(step);
        self
    }

    pub fn on_publish(mut self, step: Step) -> Self {
        self.publish.push(step);
        self
    }

    pub fn on_subscribe(mut self, step: Step) -> Self {
        self.subscribe.push(step);
        self
    }

    /// Every step of the flow, all phases included.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.request
            .iter()
            .chain(&self.response)
            .chain(&self.publish)
            .chain(&self.subscribe)
    }
}

/// Security declared by a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSecurity {
    #[serde(rename = "type")]
    pub security_type: String,
    #[serde(default)]
    pub configuration: Value,
}

/// Security-bound offer carrying its own flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub security: PlanSecurity,
    /// Optional guard expression restricting which requests the plan applies to.
    #[serde(default)]
    pub selection_rule: Option<String>,
    #[serde(default)]
    pub flows: Vec<Flow>,
}

impl Plan {
    pub fn new(id: impl Into<String>, security_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            security: PlanSecurity {
                security_type: security_type.into(),
                configuration: Value::Null,
            },
            selection_rule: None,
            flows: Vec::new(),
        }
    }

    pub fn with_selection_rule(mut self, rule: impl Into<String>) -> Self {
        self.selection_rule = Some(rule.into());
        self
    }

    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flows.push(flow);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response templates & logging
// ─────────────────────────────────────────────────────────────────────────────

/// Response rendered for a failure matching an error key and content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTemplate {
    pub status: u16,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub propagate_error_key_to_logs: bool,
}

/// Request/response logging switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub request: bool,
    pub response: bool,
}

impl LoggingSettings {
    pub fn enabled(&self) -> bool {
        self.request || self.response
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiDefinition
// ─────────────────────────────────────────────────────────────────────────────

/// Per-deployment snapshot of an API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub api_type: ApiType,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default)]
    pub endpoint_groups: Vec<EndpointGroup>,
    #[serde(default)]
    pub plans: Vec<Plan>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    /// `errorKey → contentType → template`; `*` is the wildcard content type.
    #[serde(default)]
    pub response_templates: HashMap<String, HashMap<String, ResponseTemplate>>,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl ApiDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, api_type: ApiType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            api_type,
            listeners: Vec::new(),
            endpoint_groups: Vec::new(),
            plans: Vec::new(),
            flows: Vec::new(),
            response_templates: HashMap::new(),
            logging: LoggingSettings::default(),
            properties: HashMap::new(),
        }
    }

    pub fn with_listener(mut self, listener: Listener) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_endpoint_group(mut self, group: EndpointGroup) -> Self {
        self.endpoint_groups.push(group);
        self
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plans.push(plan);
        self
    }

    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flows.push(flow);
        self
    }

    pub fn with_logging(mut self, logging: LoggingSettings) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_response_template(
        mut self,
        key: impl Into<String>,
        content_type: impl Into<String>,
        template: ResponseTemplate,
    ) -> Self {
        self.response_templates
            .entry(key.into())
            .or_default()
            .insert(content_type.into(), template);
        self
    }

    /// First listener of the given type.
    pub fn listener(&self, listener_type: ListenerType) -> Option<&Listener> {
        self.listeners
            .iter()
            .find(|l| l.listener_type == listener_type)
    }

    pub fn http_listener(&self) -> Option<&Listener> {
        self.listener(ListenerType::Http)
    }

    /// Context paths of every HTTP listener.
    pub fn context_paths(&self) -> Vec<&str> {
        self.listeners
            .iter()
            .filter(|l| l.listener_type == ListenerType::Http)
            .flat_map(|l| l.paths.iter().map(String::as_str))
            .collect()
    }

    /// CORS settings of the HTTP listener, when enabled.
    pub fn cors(&self) -> Option<&CorsSettings> {
        self.http_listener()
            .and_then(|l| l.cors.as_ref())
            .filter(|c| c.enabled)
    }

    /// Path mappings of the HTTP listener.
    pub fn path_mappings(&self) -> &[String] {
        self.http_listener()
            .map(|l| l.path_mappings.as_slice())
            .unwrap_or(&[])
    }

    pub fn plan(&self, id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == id)
    }

    /// Validate the structural invariants of this definition.
    ///
    /// Returns the *first* detected [`DefinitionError`].
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.id.trim().is_empty() {
            return Err(DefinitionError::EmptyApiId);
        }
        if self.listeners.is_empty() {
            return Err(DefinitionError::NoListeners(self.id.clone()));
        }

        let mut seen_paths = HashSet::new();
        for listener in &self.listeners {
            if listener.entrypoints.is_empty() {
                return Err(DefinitionError::NoEntrypoints {
                    api: self.id.clone(),
                    listener: listener.listener_type.as_str().to_string(),
                });
            }
            if listener
                .entrypoints
                .iter()
                .any(|e| e.entrypoint_type.trim().is_empty())
            {
                return Err(DefinitionError::EmptyEntrypointType {
                    api: self.id.clone(),
                });
            }
            for path in &listener.paths {
                if !path.starts_with('/') {
                    return Err(DefinitionError::InvalidContextPath(path.clone()));
                }
                if !seen_paths.insert(path.trim_end_matches('/').to_string()) {
                    return Err(DefinitionError::DuplicateContextPath(path.clone()));
                }
            }
        }

        let mut seen_plans = HashSet::new();
        for plan in &self.plans {
            if plan.id.trim().is_empty() {
                return Err(DefinitionError::EmptyPlanId);
            }
            if !seen_plans.insert(plan.id.as_str()) {
                return Err(DefinitionError::DuplicatePlan(plan.id.clone()));
            }
        }

        let all_flows = self.flows.iter().chain(self.plans.iter().flat_map(|p| &p.flows));
        for flow in all_flows {
            if flow.steps().any(|s| s.policy.trim().is_empty()) {
                return Err(DefinitionError::EmptyStepPolicy(flow.name.clone()));
            }
        }

        Ok(())
    }
}
