//! In-memory [`PluginRegistry`] implementation.

use crate::connector::builtin::{
    HttpGetEntrypointFactory, HttpPostEntrypointFactory, HttpProxyEndpointFactory,
    HttpProxyEntrypointFactory, MockEndpointFactory,
};
use portico_kernel::{
    EndpointConnectorFactory, EntrypointConnectorFactory, GatewayError, PluginRegistry,
    PolicyManifest,
};
use std::collections::HashMap;
use std::sync::Arc;

/// [`PluginRegistry`] backed by plain `HashMap`s, filled at startup.
#[derive(Default)]
pub struct InMemoryPluginRegistry {
    policies: HashMap<String, PolicyManifest>,
    entrypoints: HashMap<String, Arc<dyn EntrypointConnectorFactory>>,
    endpoints: HashMap<String, Arc<dyn EndpointConnectorFactory>>,
}

impl InMemoryPluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the connectors shipped with the gateway.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let entrypoints: [Arc<dyn EntrypointConnectorFactory>; 3] = [
            Arc::new(HttpProxyEntrypointFactory),
            Arc::new(HttpGetEntrypointFactory),
            Arc::new(HttpPostEntrypointFactory),
        ];
        for factory in entrypoints {
            registry.entrypoints.insert(factory.id().to_string(), factory);
        }
        let endpoints: [Arc<dyn EndpointConnectorFactory>; 2] =
            [Arc::new(HttpProxyEndpointFactory), Arc::new(MockEndpointFactory)];
        for factory in endpoints {
            registry.endpoints.insert(factory.id().to_string(), factory);
        }
        registry
    }

    pub fn register_policy(&mut self, manifest: PolicyManifest) -> Result<(), GatewayError> {
        if self.policies.contains_key(&manifest.id) {
            return Err(GatewayError::Plugin(format!("duplicate policy '{}'", manifest.id)));
        }
        self.policies.insert(manifest.id.clone(), manifest);
        Ok(())
    }

    pub fn register_entrypoint(
        &mut self,
        factory: Arc<dyn EntrypointConnectorFactory>,
    ) -> Result<(), GatewayError> {
        let id = factory.id().to_string();
        if self.entrypoints.contains_key(&id) {
            return Err(GatewayError::Plugin(format!("duplicate entrypoint '{id}'")));
        }
        self.entrypoints.insert(id, factory);
        Ok(())
    }

    pub fn register_endpoint(
        &mut self,
        factory: Arc<dyn EndpointConnectorFactory>,
    ) -> Result<(), GatewayError> {
        let id = factory.id().to_string();
        if self.endpoints.contains_key(&id) {
            return Err(GatewayError::Plugin(format!("duplicate endpoint '{id}'")));
        }
        self.endpoints.insert(id, factory);
        Ok(())
    }
}

impl PluginRegistry for InMemoryPluginRegistry {
    fn policy(&self, id: &str) -> Option<PolicyManifest> {
        self.policies.get(id).cloned()
    }

    fn entrypoint_factory(&self, id: &str) -> Option<Arc<dyn EntrypointConnectorFactory>> {
        self.entrypoints.get(id).cloned()
    }

    fn endpoint_factory(&self, id: &str) -> Option<Arc<dyn EndpointConnectorFactory>> {
        self.endpoints.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use portico_kernel::{GatewayResult, Policy, PolicyPluginFactory};
    use serde_json::Value;

    struct Noop;

    #[async_trait]
    impl Policy for Noop {
        fn id(&self) -> &str {
            "noop"
        }
    }

    struct NoopFactory;

    impl PolicyPluginFactory for NoopFactory {
        fn create(&self, _configuration: &Value) -> GatewayResult<Arc<dyn Policy>> {
            Ok(Arc::new(Noop))
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = InMemoryPluginRegistry::with_builtins();
        for id in ["http-proxy", "http-get", "http-post"] {
            assert!(registry.entrypoint_factory(id).is_some(), "{id}");
        }
        assert!(registry.endpoint_factory("mock").is_some());
        assert!(registry.endpoint_factory("kafka").is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = InMemoryPluginRegistry::with_builtins();
        registry
            .register_policy(PolicyManifest::native("noop", Arc::new(NoopFactory)))
            .unwrap();
        assert!(registry
            .register_policy(PolicyManifest::native("noop", Arc::new(NoopFactory)))
            .is_err());
        assert!(registry.register_endpoint(Arc::new(MockEndpointFactory)).is_err());
        assert!(registry.policy("noop").is_some());
    }
}
