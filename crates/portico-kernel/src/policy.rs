//! Policy contracts.
//!
//! A [`Policy`] is one unit of cross-cutting behavior executed by a policy
//! chain.  Policies written against the older request/response-only shape
//! implement [`LegacyPolicy`] instead; the runtime bridges them through an
//! adapter so the chain only ever sees [`Policy`].

use crate::context::{ExecutionContext, MessageScope};
use crate::error::{ExecutionFailure, GatewayResult};
use crate::http::{Request, Response};
use crate::message::{Message, MessageFlow};
use crate::phase::{ExecutionPhase, StreamType};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for a policy instance.
///
/// Every lifecycle method has a pass-through default so a policy only
/// overrides the phases it acts on.  Returning
/// [`GatewayError::Interrupted`](crate::GatewayError::Interrupted) ends the
/// phase without a failure once the policy completed the response itself.
#[async_trait]
pub trait Policy: Send + Sync {
    /// Stable identifier (the manifest id), used by hooks and diagnostics.
    fn id(&self) -> &str;

    async fn on_request(&self, _ctx: &mut ExecutionContext) -> GatewayResult<()> {
        Ok(())
    }

    async fn on_response(&self, _ctx: &mut ExecutionContext) -> GatewayResult<()> {
        Ok(())
    }

    /// Transform a whole message flow.  The returned flow replaces `flow`.
    async fn on_message_flow(
        &self,
        _scope: &MessageScope,
        _phase: ExecutionPhase,
        flow: MessageFlow,
    ) -> GatewayResult<MessageFlow> {
        Ok(flow)
    }

    /// Transform one message.  `None` drops the message from the flow.
    async fn on_message(
        &self,
        _scope: &MessageScope,
        _phase: ExecutionPhase,
        message: Message,
    ) -> GatewayResult<Option<Message>> {
        Ok(Some(message))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Legacy policies
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a legacy policy step.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyOutcome {
    Continue,
    Fail(ExecutionFailure),
}

/// Synchronous request/response-only policy shape.
pub trait LegacyPolicy: Send + Sync {
    fn id(&self) -> &str;

    fn on_request(&self, _request: &mut Request, _response: &mut Response) -> LegacyOutcome {
        LegacyOutcome::Continue
    }

    fn on_response(&self, _request: &mut Request, _response: &mut Response) -> LegacyOutcome {
        LegacyOutcome::Continue
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin factories & manifests
// ─────────────────────────────────────────────────────────────────────────────

/// Builds policy instances of one plugin.
pub trait PolicyPluginFactory: Send + Sync {
    fn create(&self, configuration: &Value) -> GatewayResult<Arc<dyn Policy>>;

    /// Release plugin-wide resources.  Called on undeploy, possibly without
    /// any instance having been created.
    fn cleanup(&self) {}
}

/// Builds legacy policy instances of one plugin.
pub trait LegacyPolicyPluginFactory: Send + Sync {
    fn create(&self, configuration: &Value) -> GatewayResult<Arc<dyn LegacyPolicy>>;

    fn cleanup(&self) {}
}

/// Implementation shape of a policy plugin.
#[derive(Clone)]
pub enum PolicyPlugin {
    Native(Arc<dyn PolicyPluginFactory>),
    Legacy(Arc<dyn LegacyPolicyPluginFactory>),
}

impl PolicyPlugin {
    pub fn is_legacy(&self) -> bool {
        matches!(self, PolicyPlugin::Legacy(_))
    }

    pub fn cleanup(&self) {
        match self {
            PolicyPlugin::Native(factory) => factory.cleanup(),
            PolicyPlugin::Legacy(factory) => factory.cleanup(),
        }
    }
}

/// Static descriptor of a registered policy plugin.
#[derive(Clone)]
pub struct PolicyManifest {
    pub id: String,
    pub plugin: PolicyPlugin,
    pub stream_types: Vec<StreamType>,
}

impl PolicyManifest {
    pub fn native(id: impl Into<String>, factory: Arc<dyn PolicyPluginFactory>) -> Self {
        Self {
            id: id.into(),
            plugin: PolicyPlugin::Native(factory),
            stream_types: vec![StreamType::OnRequest, StreamType::OnResponse],
        }
    }

    pub fn legacy(id: impl Into<String>, factory: Arc<dyn LegacyPolicyPluginFactory>) -> Self {
        Self {
            id: id.into(),
            plugin: PolicyPlugin::Legacy(factory),
            stream_types: vec![StreamType::OnRequest, StreamType::OnResponse],
        }
    }

    /// Builder: restrict the supported stream types.
    pub fn with_stream_types(mut self, stream_types: Vec<StreamType>) -> Self {
        self.stream_types = stream_types;
        self
    }

    pub fn supports(&self, stream_type: StreamType) -> bool {
        self.stream_types.contains(&stream_type)
    }
}

impl fmt::Debug for PolicyManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyManifest")
            .field("id", &self.id)
            .field("legacy", &self.plugin.is_legacy())
            .field("stream_types", &self.stream_types)
            .finish()
    }
}
