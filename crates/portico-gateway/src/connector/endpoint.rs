//! Endpoint connector resolution for one API deployment.

use parking_lot::Mutex;
use portico_kernel::context::ATTR_REQUEST_ENDPOINT;
use portico_kernel::{
    DeploymentContext, EndpointConnector, EndpointGroup, ExecutionContext, PluginRegistry,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

#[derive(Default)]
struct Instances {
    by_target: HashMap<(usize, usize), Arc<dyn EndpointConnector>>,
    created: Vec<Arc<dyn EndpointConnector>>,
}

/// Picks the backend connector for a request.
///
/// The target group is the one named by the `request.endpoint` attribute,
/// or the first declared group.  Endpoints inside a group are used
/// round-robin; each `(group, endpoint)` connector is created on first use.
pub struct EndpointConnectorResolver {
    deployment: DeploymentContext,
    registry: Arc<dyn PluginRegistry>,
    instances: Mutex<Instances>,
    cursor: AtomicUsize,
    stopping: AtomicBool,
}

impl EndpointConnectorResolver {
    pub fn new(deployment: DeploymentContext, registry: Arc<dyn PluginRegistry>) -> Self {
        Self {
            deployment,
            registry,
            instances: Mutex::new(Instances::default()),
            cursor: AtomicUsize::new(0),
            stopping: AtomicBool::new(false),
        }
    }

    /// Connector and endpoint name for the request, `None` on any miss.
    pub fn resolve(&self, ctx: &ExecutionContext) -> Option<(String, Arc<dyn EndpointConnector>)> {
        if self.stopping.load(Ordering::Acquire) {
            return None;
        }
        let groups = &self.deployment.api.endpoint_groups;
        let (group_idx, group) = match ctx.get_attr::<String>(ATTR_REQUEST_ENDPOINT) {
            Some(name) => groups.iter().enumerate().find(|(_, g)| g.name == name)?,
            None => groups.iter().enumerate().next()?,
        };
        if group.endpoints.is_empty() {
            return None;
        }
        let endpoint_idx = self.cursor.fetch_add(1, Ordering::Relaxed) % group.endpoints.len();
        let connector = self.connector(group_idx, endpoint_idx, group)?;
        Some((group.endpoints[endpoint_idx].name.clone(), connector))
    }

    fn connector(
        &self,
        group_idx: usize,
        endpoint_idx: usize,
        group: &EndpointGroup,
    ) -> Option<Arc<dyn EndpointConnector>> {
        let mut instances = self.instances.lock();
        if let Some(connector) = instances.by_target.get(&(group_idx, endpoint_idx)) {
            return Some(connector.clone());
        }
        let Some(factory) = self.registry.endpoint_factory(&group.endpoint_type) else {
            debug!(endpoint = %group.endpoint_type, "no endpoint factory registered");
            return None;
        };
        let endpoint = &group.endpoints[endpoint_idx];
        match factory.create(&endpoint.configuration, &group.shared_configuration, &self.deployment) {
            Ok(connector) => {
                instances
                    .by_target
                    .insert((group_idx, endpoint_idx), connector.clone());
                instances.created.push(connector.clone());
                Some(connector)
            }
            Err(err) => {
                warn!(endpoint = %endpoint.name, error = %err, "unable to create endpoint connector");
                None
            }
        }
    }

    pub async fn pre_stop(&self) {
        self.stopping.store(true, Ordering::Release);
        let connectors = self.instances.lock().created.clone();
        for connector in connectors {
            if let Err(err) = connector.pre_stop().await {
                warn!(connector = connector.id(), error = %err, "endpoint pre-stop failed");
            }
        }
    }

    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        let connectors = self.instances.lock().created.clone();
        for connector in connectors {
            if let Err(err) = connector.stop().await {
                warn!(connector = connector.id(), error = %err, "endpoint stop failed");
            }
        }
    }
}
