//! Deployment events.

use crate::definition::ApiDefinition;

/// Lifecycle notification for a deployable API.
#[derive(Debug, Clone, PartialEq)]
pub enum ReactableEvent {
    Deploy(ApiDefinition),
    Update(ApiDefinition),
    Undeploy(String),
}

impl ReactableEvent {
    pub fn api_id(&self) -> &str {
        match self {
            ReactableEvent::Deploy(api) | ReactableEvent::Update(api) => &api.id,
            ReactableEvent::Undeploy(id) => id,
        }
    }
}
