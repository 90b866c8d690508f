//! Entrypoint connector resolution for one API deployment.

use parking_lot::Mutex;
use portico_kernel::{
    ApiType, DeploymentContext, EntrypointConnector, ExecutionContext, Listener, ListenerType,
    PluginRegistry, Qos,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Cache slot: `(listener index, entrypoint index)` in the definition.
type Slot = (usize, usize);

#[derive(Default)]
struct Instances {
    by_slot: HashMap<Slot, Arc<dyn EntrypointConnector>>,
    /// Creation order, used for teardown.
    created: Vec<Arc<dyn EntrypointConnector>>,
}

/// Selects the entrypoint connector serving a request.
///
/// Connectors are created lazily the first time resolution reaches their
/// entrypoint and are reused for the rest of the deployment.  A miss is
/// `None`, never an error.  Once [`pre_stop`](Self::pre_stop) has run the
/// resolver resolves nothing.
pub struct EntrypointConnectorResolver {
    deployment: DeploymentContext,
    registry: Arc<dyn PluginRegistry>,
    instances: Mutex<Instances>,
    stopping: AtomicBool,
}

impl EntrypointConnectorResolver {
    pub fn new(deployment: DeploymentContext, registry: Arc<dyn PluginRegistry>) -> Self {
        Self {
            deployment,
            registry,
            instances: Mutex::new(Instances::default()),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn resolve(&self, ctx: &ExecutionContext) -> Option<Arc<dyn EntrypointConnector>> {
        if self.stopping.load(Ordering::Acquire) {
            return None;
        }
        let listener_type = ctx.listener_type()?;
        let (listener_idx, listener) = self.select_listener(listener_type)?;

        for (entrypoint_idx, entrypoint) in listener.entrypoints.iter().enumerate() {
            let Some(connector) = self.connector((listener_idx, entrypoint_idx), listener) else {
                continue;
            };
            if connector.supported_listener_type() != listener_type {
                continue;
            }
            if connector.matches(ctx) {
                debug!(
                    api = %self.deployment.api.id,
                    entrypoint = %entrypoint.entrypoint_type,
                    "entrypoint resolved"
                );
                return Some(connector);
            }
        }
        None
    }

    /// Listener able to serve `listener_type`; subscription listeners are
    /// only considered for message APIs.
    fn select_listener(&self, listener_type: ListenerType) -> Option<(usize, &Listener)> {
        let api = &self.deployment.api;
        if listener_type == ListenerType::Subscription && api.api_type != ApiType::Message {
            return None;
        }
        api.listeners
            .iter()
            .enumerate()
            .find(|(_, l)| l.listener_type == listener_type)
    }

    fn connector(&self, slot: Slot, listener: &Listener) -> Option<Arc<dyn EntrypointConnector>> {
        let mut instances = self.instances.lock();
        if let Some(connector) = instances.by_slot.get(&slot) {
            return Some(connector.clone());
        }

        let entrypoint = &listener.entrypoints[slot.1];
        let Some(factory) = self.registry.entrypoint_factory(&entrypoint.entrypoint_type) else {
            debug!(entrypoint = %entrypoint.entrypoint_type, "no connector factory registered, skipping entrypoint");
            return None;
        };
        let qos = match factory.supported_api_type() {
            ApiType::Message => Some(entrypoint.qos.unwrap_or(Qos::Auto)),
            ApiType::Proxy => None,
        };
        match factory.create(&entrypoint.configuration, qos, &self.deployment) {
            Ok(connector) => {
                instances.by_slot.insert(slot, connector.clone());
                instances.created.push(connector.clone());
                Some(connector)
            }
            Err(err) => {
                warn!(entrypoint = %entrypoint.entrypoint_type, error = %err, "unable to create entrypoint connector");
                None
            }
        }
    }

    /// Number of connectors instantiated so far.
    pub fn instantiated(&self) -> usize {
        self.instances.lock().created.len()
    }

    /// Stop resolving and let every connector prepare for shutdown.
    pub async fn pre_stop(&self) {
        self.stopping.store(true, Ordering::Release);
        for connector in self.snapshot() {
            if let Err(err) = connector.pre_stop().await {
                warn!(connector = connector.id(), error = %err, "entrypoint pre-stop failed");
            }
        }
    }

    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        for connector in self.snapshot() {
            if let Err(err) = connector.stop().await {
                warn!(connector = connector.id(), error = %err, "entrypoint stop failed");
            }
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn EntrypointConnector>> {
        self.instances.lock().created.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use portico_kernel::{
        ApiDefinition, ConnectorKind, ConnectorMode, EndpointConnectorFactory, Entrypoint,
        EntrypointConnectorFactory, GatewayError, GatewayResult, HttpMethod, PolicyManifest,
        Request,
    };
    use serde_json::{Value, json};
    use std::sync::atomic::AtomicUsize;

    struct Fixed {
        listener: ListenerType,
        matches: bool,
        fail_pre_stop: bool,
        fail_stop: bool,
        journal: Arc<Mutex<Vec<String>>>,
        name: String,
    }

    #[async_trait]
    impl EntrypointConnector for Fixed {
        fn id(&self) -> &str {
            &self.name
        }
        fn kind(&self) -> ConnectorKind {
            ConnectorKind::Proxy
        }
        fn supported_listener_type(&self) -> ListenerType {
            self.listener
        }
        fn supported_api_type(&self) -> ApiType {
            ApiType::Proxy
        }
        fn supported_modes(&self) -> &[ConnectorMode] {
            &[ConnectorMode::RequestResponse]
        }
        fn matches(&self, _ctx: &ExecutionContext) -> bool {
            self.matches
        }
        async fn handle_request(&self, _ctx: &mut ExecutionContext) -> GatewayResult<()> {
            Ok(())
        }
        async fn handle_response(&self, _ctx: &mut ExecutionContext) -> GatewayResult<()> {
            Ok(())
        }
        async fn pre_stop(&self) -> GatewayResult<()> {
            self.journal.lock().push(format!("pre_stop:{}", self.name));
            if self.fail_pre_stop {
                return Err(GatewayError::Connector("pre-stop failed".into()));
            }
            Ok(())
        }
        async fn stop(&self) -> GatewayResult<()> {
            self.journal.lock().push(format!("stop:{}", self.name));
            if self.fail_stop {
                return Err(GatewayError::Connector("stop failed".into()));
            }
            Ok(())
        }
    }

    /// Builds connectors from
    /// `{ "name", "matches", "listener", "fail_pre_stop", "fail_stop" }`.
    struct FixedFactory {
        api_type: ApiType,
        created: AtomicUsize,
        journal: Arc<Mutex<Vec<String>>>,
        last_qos: Mutex<Option<Qos>>,
    }

    impl EntrypointConnectorFactory for FixedFactory {
        fn id(&self) -> &str {
            "fixed"
        }
        fn supported_api_type(&self) -> ApiType {
            self.api_type
        }
        fn create(
            &self,
            configuration: &Value,
            qos: Option<Qos>,
            _deployment: &DeploymentContext,
        ) -> GatewayResult<Arc<dyn EntrypointConnector>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            *self.last_qos.lock() = qos;
            Ok(Arc::new(Fixed {
                listener: match configuration["listener"].as_str() {
                    Some("subscription") => ListenerType::Subscription,
                    _ => ListenerType::Http,
                },
                matches: configuration["matches"].as_bool().unwrap_or(false),
                fail_pre_stop: configuration["fail_pre_stop"].as_bool().unwrap_or(false),
                fail_stop: configuration["fail_stop"].as_bool().unwrap_or(false),
                journal: self.journal.clone(),
                name: configuration["name"].as_str().unwrap_or("anon").to_string(),
            }))
        }
    }

    struct Registry(Arc<FixedFactory>);

    impl PluginRegistry for Registry {
        fn policy(&self, _id: &str) -> Option<PolicyManifest> {
            None
        }
        fn entrypoint_factory(&self, id: &str) -> Option<Arc<dyn EntrypointConnectorFactory>> {
            (id == "fixed").then(|| self.0.clone() as Arc<dyn EntrypointConnectorFactory>)
        }
        fn endpoint_factory(&self, _id: &str) -> Option<Arc<dyn EndpointConnectorFactory>> {
            None
        }
    }

    fn entry(name: &str, matches: bool) -> Entrypoint {
        Entrypoint::new("fixed").with_configuration(json!({ "name": name, "matches": matches }))
    }

    fn build(api: ApiDefinition, api_type: ApiType) -> (Arc<FixedFactory>, EntrypointConnectorResolver) {
        let factory = Arc::new(FixedFactory {
            api_type,
            created: AtomicUsize::new(0),
            journal: Arc::new(Mutex::new(Vec::new())),
            last_qos: Mutex::new(None),
        });
        let resolver = EntrypointConnectorResolver::new(
            DeploymentContext::new(Arc::new(api)),
            Arc::new(Registry(factory.clone())),
        );
        (factory, resolver)
    }

    fn http_ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(Request::new("r1", HttpMethod::Get, "/echo"));
        ctx.set_listener_type(ListenerType::Http);
        ctx
    }

    #[test]
    fn first_matching_entrypoint_wins_and_later_ones_stay_lazy() {
        let api = ApiDefinition::new("api", "Api", ApiType::Proxy).with_listener(
            Listener::http("/echo")
                .with_entrypoint(entry("one", false))
                .with_entrypoint(entry("two", true))
                .with_entrypoint(entry("three", true)),
        );
        let (factory, resolver) = build(api, ApiType::Proxy);

        let connector = resolver.resolve(&http_ctx()).unwrap();
        assert_eq!(connector.id(), "two");
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);

        resolver.resolve(&http_ctx()).unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.instantiated(), 2);
    }

    #[test]
    fn missing_factory_is_skipped() {
        let api = ApiDefinition::new("api", "Api", ApiType::Proxy).with_listener(
            Listener::http("/echo")
                .with_entrypoint(Entrypoint::new("unknown"))
                .with_entrypoint(entry("known", true)),
        );
        let (_, resolver) = build(api, ApiType::Proxy);
        assert_eq!(resolver.resolve(&http_ctx()).unwrap().id(), "known");
    }

    #[test]
    fn listener_type_mismatch_never_resolves() {
        let api = ApiDefinition::new("api", "Api", ApiType::Proxy).with_listener(
            Listener::http("/echo").with_entrypoint(
                Entrypoint::new("fixed")
                    .with_configuration(json!({ "matches": true, "listener": "subscription" })),
            ),
        );
        let (_, resolver) = build(api, ApiType::Proxy);
        assert!(resolver.resolve(&http_ctx()).is_none());

        let untyped = ExecutionContext::new(Request::new("r1", HttpMethod::Get, "/echo"));
        assert!(resolver.resolve(&untyped).is_none());
    }

    #[test]
    fn subscription_listener_requires_a_message_api() {
        let listener = Listener::new(ListenerType::Subscription).with_entrypoint(
            Entrypoint::new("fixed")
                .with_configuration(json!({ "matches": true, "listener": "subscription" })),
        );
        let mut ctx = http_ctx();
        ctx.set_listener_type(ListenerType::Subscription);

        let proxy = ApiDefinition::new("api", "Api", ApiType::Proxy).with_listener(listener.clone());
        let (_, resolver) = build(proxy, ApiType::Proxy);
        assert!(resolver.resolve(&ctx).is_none());

        let message = ApiDefinition::new("api", "Api", ApiType::Message).with_listener(listener);
        let (_, resolver) = build(message, ApiType::Proxy);
        assert!(resolver.resolve(&ctx).is_some());
    }

    #[test]
    fn message_factories_receive_qos() {
        let api = ApiDefinition::new("api", "Api", ApiType::Message).with_listener(
            Listener::http("/echo")
                .with_entrypoint(entry("auto", false))
                .with_entrypoint(entry("explicit", true).with_qos(Qos::AtLeastOnce)),
        );
        let (factory, resolver) = build(api, ApiType::Message);
        resolver.resolve(&http_ctx()).unwrap();
        assert_eq!(*factory.last_qos.lock(), Some(Qos::AtLeastOnce));

        let proxy = ApiDefinition::new("api", "Api", ApiType::Proxy)
            .with_listener(Listener::http("/echo").with_entrypoint(entry("p", true)));
        let (factory, resolver) = build(proxy, ApiType::Proxy);
        resolver.resolve(&http_ctx()).unwrap();
        assert_eq!(*factory.last_qos.lock(), None);
    }

    #[tokio::test]
    async fn teardown_visits_every_connector_and_fails_closed() {
        let api = ApiDefinition::new("api", "Api", ApiType::Proxy).with_listener(
            Listener::http("/echo")
                .with_entrypoint(
                    Entrypoint::new("fixed")
                        .with_configuration(json!({ "name": "a", "fail_stop": true })),
                )
                .with_entrypoint(entry("b", true)),
        );
        let (factory, resolver) = build(api, ApiType::Proxy);
        resolver.resolve(&http_ctx()).unwrap();

        resolver.pre_stop().await;
        assert!(resolver.resolve(&http_ctx()).is_none());
        resolver.stop().await;

        assert_eq!(
            *factory.journal.lock(),
            vec!["pre_stop:a", "pre_stop:b", "stop:a", "stop:b"]
        );
    }

    #[tokio::test]
    async fn failing_pre_stop_does_not_skip_later_connectors() {
        let api = ApiDefinition::new("api", "Api", ApiType::Proxy).with_listener(
            Listener::http("/echo")
                .with_entrypoint(entry("a", false))
                .with_entrypoint(
                    Entrypoint::new("fixed")
                        .with_configuration(json!({ "name": "b", "fail_pre_stop": true })),
                )
                .with_entrypoint(entry("c", true)),
        );
        let (factory, resolver) = build(api, ApiType::Proxy);
        assert_eq!(resolver.resolve(&http_ctx()).unwrap().id(), "c");
        assert_eq!(resolver.instantiated(), 3);

        resolver.pre_stop().await;
        resolver.stop().await;

        assert_eq!(
            *factory.journal.lock(),
            vec!["pre_stop:a", "pre_stop:b", "pre_stop:c", "stop:a", "stop:b", "stop:c"]
        );
    }
}
