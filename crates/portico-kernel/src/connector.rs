//! Entrypoint and endpoint connector contracts.
//!
//! Entrypoint connectors terminate client traffic for one listener entry,
//! endpoint connectors dial the backend.  Both come in a synchronous
//! (`Proxy`) and an asynchronous (`Message`) flavor and are built by
//! factories registered in the [`PluginRegistry`](crate::PluginRegistry).

use crate::context::ExecutionContext;
use crate::definition::{ApiDefinition, ApiType, ListenerType, Qos};
use crate::error::GatewayResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Synchronous request/response or asynchronous message connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    Proxy,
    Message,
}

/// Interaction modes a connector supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorMode {
    RequestResponse,
    Publish,
    Subscribe,
}

/// What a factory knows about the deployment it builds connectors for.
#[derive(Debug, Clone)]
pub struct DeploymentContext {
    pub api: Arc<ApiDefinition>,
}

impl DeploymentContext {
    pub fn new(api: Arc<ApiDefinition>) -> Self {
        Self { api }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entrypoints
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait EntrypointConnector: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> ConnectorKind;

    fn supported_listener_type(&self) -> ListenerType;

    fn supported_api_type(&self) -> ApiType;

    fn supported_modes(&self) -> &[ConnectorMode];

    /// Whether this connector accepts the request held by `ctx`.
    fn matches(&self, ctx: &ExecutionContext) -> bool;

    /// Adapt the inbound request (e.g. turn the body into messages).
    async fn handle_request(&self, ctx: &mut ExecutionContext) -> GatewayResult<()>;

    /// Write the response the way this entrypoint's clients expect it.
    async fn handle_response(&self, ctx: &mut ExecutionContext) -> GatewayResult<()>;

    async fn pre_stop(&self) -> GatewayResult<()> {
        Ok(())
    }

    async fn stop(&self) -> GatewayResult<()> {
        Ok(())
    }
}

pub trait EntrypointConnectorFactory: Send + Sync {
    fn id(&self) -> &str;

    fn supported_api_type(&self) -> ApiType;

    /// Build a connector for one entrypoint.  `qos` is only provided to
    /// factories of message APIs.
    fn create(
        &self,
        configuration: &Value,
        qos: Option<Qos>,
        deployment: &DeploymentContext,
    ) -> GatewayResult<Arc<dyn EntrypointConnector>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoints
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait EndpointConnector: Send + Sync {
    fn id(&self) -> &str;

    fn supported_api_type(&self) -> ApiType;

    fn supported_modes(&self) -> &[ConnectorMode];

    /// Perform the backend call: fill the response (proxy) or wire the
    /// request/response message flows (message).
    async fn connect(&self, ctx: &mut ExecutionContext) -> GatewayResult<()>;

    async fn pre_stop(&self) -> GatewayResult<()> {
        Ok(())
    }

    async fn stop(&self) -> GatewayResult<()> {
        Ok(())
    }
}

pub trait EndpointConnectorFactory: Send + Sync {
    fn id(&self) -> &str;

    fn supported_api_type(&self) -> ApiType;

    /// Build a connector for one endpoint of a group.
    fn create(
        &self,
        configuration: &Value,
        shared_configuration: &Value,
        deployment: &DeploymentContext,
    ) -> GatewayResult<Arc<dyn EndpointConnector>>;
}
