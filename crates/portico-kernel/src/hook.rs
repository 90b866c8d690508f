//! Hooks around policy, processor and message execution.
//!
//! Hooks observe; they never change the outcome of the call they wrap.  A
//! hook error is logged by the caller and otherwise ignored.

use crate::context::{ExecutionContext, MessageScope};
use crate::error::{GatewayError, GatewayResult};
use crate::message::Message;
use crate::phase::ExecutionPhase;
use async_trait::async_trait;

/// Observes policy and processor calls.
pub trait Hook: Send + Sync {
    fn id(&self) -> &str;

    fn pre(
        &self,
        _target: &str,
        _ctx: &ExecutionContext,
        _phase: ExecutionPhase,
    ) -> GatewayResult<()> {
        Ok(())
    }

    fn post(
        &self,
        _target: &str,
        _ctx: &ExecutionContext,
        _phase: ExecutionPhase,
    ) -> GatewayResult<()> {
        Ok(())
    }

    fn error(
        &self,
        _target: &str,
        _ctx: &ExecutionContext,
        _phase: ExecutionPhase,
        _error: &GatewayError,
    ) -> GatewayResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait MessageHook: Send + Sync {
    fn id(&self) -> &str;

    async fn pre(
        &self,
        _target: &str,
        _scope: &MessageScope,
        _message: &Message,
        _phase: ExecutionPhase,
    ) -> GatewayResult<()> {
        Ok(())
    }

    async fn post(
        &self,
        _target: &str,
        _scope: &MessageScope,
        _message: &Message,
        _phase: ExecutionPhase,
    ) -> GatewayResult<()> {
        Ok(())
    }

    async fn error(
        &self,
        _target: &str,
        _scope: &MessageScope,
        _phase: ExecutionPhase,
        _error: &GatewayError,
    ) -> GatewayResult<()> {
        Ok(())
    }
}
