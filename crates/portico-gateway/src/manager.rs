//! Deployment lifecycle of APIs on this node.

use crate::error::DeployError;
use crate::reactor::{ApiReactor, ReactorServices};
use crate::routing::{ContextPathRouter, normalize};
use parking_lot::RwLock;
use portico_kernel::{ApiDefinition, ReactableEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Consumes deployment events and routes requests to the matching reactor.
///
/// Context paths are matched by longest prefix across every deployed API.
/// An update swaps the routes of the API atomically, then stops the
/// previous reactor; an undeploy removes the routes before stopping.
pub struct ApiManager {
    services: ReactorServices,
    router: RwLock<ContextPathRouter<Arc<ApiReactor>>>,
    reactors: RwLock<HashMap<String, Arc<ApiReactor>>>,
}

impl ApiManager {
    pub fn new(services: ReactorServices) -> Self {
        Self {
            services,
            router: RwLock::new(ContextPathRouter::new()),
            reactors: RwLock::new(HashMap::new()),
        }
    }

    pub async fn handle(&self, event: ReactableEvent) -> Result<(), DeployError> {
        match event {
            ReactableEvent::Deploy(api) | ReactableEvent::Update(api) => self.deploy(api).await,
            ReactableEvent::Undeploy(id) => self.undeploy(&id).await,
        }
    }

    /// Deploy `api`, replacing any running deployment with the same id.
    pub async fn deploy(&self, api: ApiDefinition) -> Result<(), DeployError> {
        api.validate()?;
        self.check_conflicts(&api)?;

        let id = api.id.clone();
        let reactor = Arc::new(
            ApiReactor::start(api, &self.services).map_err(|source| DeployError::Start {
                api: id.clone(),
                source,
            })?,
        );

        let previous = {
            let mut router = self.router.write();
            router.deregister(|r| r.id() == id);
            for path in reactor.api().context_paths() {
                router.register(path, reactor.clone());
            }
            self.reactors.write().insert(id.clone(), reactor.clone())
        };
        info!(api = %id, paths = ?reactor.api().context_paths(), replaced = previous.is_some(), "API deployed");

        if let Some(previous) = previous {
            previous.stop().await;
        }
        Ok(())
    }

    pub async fn undeploy(&self, id: &str) -> Result<(), DeployError> {
        let removed = {
            let mut router = self.router.write();
            router.deregister(|r| r.id() == id);
            self.reactors.write().remove(id)
        };
        let reactor = removed.ok_or_else(|| DeployError::UnknownApi(id.to_string()))?;
        reactor.stop().await;
        info!(api = %id, "API undeployed");
        Ok(())
    }

    fn check_conflicts(&self, api: &ApiDefinition) -> Result<(), DeployError> {
        let reactors = self.reactors.read();
        for path in api.context_paths() {
            let path = normalize(path);
            let owner = reactors
                .values()
                .filter(|r| r.id() != api.id)
                .find(|r| r.api().context_paths().into_iter().any(|p| normalize(p) == path));
            if let Some(owner) = owner {
                warn!(api = %api.id, path = %path, owner = owner.id(), "context path conflict");
                return Err(DeployError::ContextPathConflict {
                    path,
                    api: owner.id().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Reactor serving `path`, with the matched context path.
    pub fn route(&self, path: &str) -> Option<(String, Arc<ApiReactor>)> {
        self.router
            .read()
            .resolve(path)
            .map(|(context_path, reactor)| (context_path.to_string(), reactor))
    }

    /// Ids of the deployed APIs, sorted.
    pub fn apis(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.reactors.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Undeploy everything.
    pub async fn stop(&self) {
        let reactors: Vec<Arc<ApiReactor>> = {
            let mut router = self.router.write();
            router.deregister(|_| true);
            self.reactors.write().drain().map(|(_, r)| r).collect()
        };
        for reactor in reactors {
            reactor.stop().await;
        }
    }
}
