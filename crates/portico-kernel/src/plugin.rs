//! Plugin lookup contract.

use crate::connector::{EndpointConnectorFactory, EntrypointConnectorFactory};
use crate::policy::PolicyManifest;
use std::sync::Arc;

/// Capability-typed plugin registry.  Resolution components only look
/// plugins up; they never construct them.
pub trait PluginRegistry: Send + Sync {
    fn policy(&self, id: &str) -> Option<PolicyManifest>;

    fn entrypoint_factory(&self, id: &str) -> Option<Arc<dyn EntrypointConnectorFactory>>;

    fn endpoint_factory(&self, id: &str) -> Option<Arc<dyn EndpointConnectorFactory>>;
}
