//! Execution phases and policy stream types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the request lifecycle a policy chain is executed for.
///
/// The phase drives which [`Policy`](crate::policy::Policy) method the chain
/// invokes and which context shape it requires: the two `Async*` phases
/// operate on message flows and need a message-capable context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionPhase {
    Request,
    Response,
    AsyncRequest,
    AsyncResponse,
}

impl ExecutionPhase {
    /// `true` for the message phases.
    pub fn is_async(&self) -> bool {
        matches!(self, ExecutionPhase::AsyncRequest | ExecutionPhase::AsyncResponse)
    }

    /// `true` for the request direction (sync or async).
    pub fn is_request(&self) -> bool {
        matches!(self, ExecutionPhase::Request | ExecutionPhase::AsyncRequest)
    }

    /// Policy stream type this phase maps onto.
    pub fn stream_type(&self) -> StreamType {
        if self.is_request() {
            StreamType::OnRequest
        } else {
            StreamType::OnResponse
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExecutionPhase::Request => "request",
            ExecutionPhase::Response => "response",
            ExecutionPhase::AsyncRequest => "async_request",
            ExecutionPhase::AsyncResponse => "async_response",
        }
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Direction a policy manifest declares support for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamType {
    OnRequest,
    OnResponse,
}
