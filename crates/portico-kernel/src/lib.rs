//! Portico gateway kernel contract.
//!
//! This crate defines the *data model, trait interfaces and error taxonomy*
//! of the Portico API gateway.  No runtime wiring lives here: the policy
//! chain, resolvers, processor chains and the HTTP server belong in
//! `portico-gateway`.
//!
//! # Architecture mapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              portico-kernel  (this crate)                   │
//! │  ApiDefinition + validate()   ExecutionContext / Metrics    │
//! │  Policy / LegacyPolicy        PolicyManifest                │
//! │  EntrypointConnector / EndpointConnector (+ factories)      │
//! │  AuthenticationHandler        Processor / Hook / Reporter   │
//! │  PluginRegistry               GatewayError                  │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              portico-gateway  (runtime crate)               │
//! │  DefaultPolicyFactory / PolicyChain / ConditionalPolicy     │
//! │  EntrypointConnectorResolver / SecurityPolicyResolver       │
//! │  Api / Platform / NotFound processor chain factories        │
//! │  ApiReactor / ApiManager / GatewayServer (axum)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod connector;
pub mod context;
pub mod definition;
pub mod error;
pub mod event;
pub mod headers;
pub mod hook;
pub mod http;
pub mod message;
pub mod metrics;
pub mod phase;
pub mod plugin;
pub mod policy;
pub mod processor;
pub mod report;
pub mod security;

// ── Flat re-exports ────────────────────────────────────────────────────────

pub use connector::{
    ConnectorKind, ConnectorMode, DeploymentContext, EndpointConnector, EndpointConnectorFactory,
    EntrypointConnector, EntrypointConnectorFactory,
};
pub use context::{ContextKind, ExecutionContext, MessageScope, TemplateVariableProvider};
pub use definition::{
    ApiDefinition, ApiType, CorsSettings, Endpoint, EndpointGroup, Entrypoint, Flow, FlowSelector,
    Listener, ListenerType, LoggingSettings, Plan, PlanSecurity, Qos, ResponseTemplate, Step,
};
pub use error::{DefinitionError, ExecutionFailure, GatewayError, GatewayResult};
pub use event::ReactableEvent;
pub use headers::HttpHeaders;
pub use hook::{Hook, MessageHook};
pub use http::{HttpMethod, Request, Response};
pub use message::{Message, MessageFlow};
pub use metrics::{Log, LogEntry, Metrics};
pub use phase::{ExecutionPhase, StreamType};
pub use plugin::PluginRegistry;
pub use policy::{
    LegacyOutcome, LegacyPolicy, LegacyPolicyPluginFactory, Policy, PolicyManifest, PolicyPlugin,
    PolicyPluginFactory,
};
pub use processor::Processor;
pub use report::{AlertEvent, AlertEventProducer, Reporter};
pub use security::{AuthenticationHandler, AuthenticationPolicy};
