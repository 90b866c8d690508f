//! Sorted authentication handler set with optional per-API narrowing.

use parking_lot::RwLock;
use portico_kernel::{ApiDefinition, AuthenticationHandler};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub type HandlerList = Arc<Vec<Arc<dyn AuthenticationHandler>>>;

/// Narrows the handler set before it is cached.
pub trait AuthenticationHandlerEnhancer: Send + Sync {
    fn filter(&self, handlers: Vec<Arc<dyn AuthenticationHandler>>) -> Vec<Arc<dyn AuthenticationHandler>>;
}

/// Keeps the handlers whose security type is offered by a plan of the API.
pub struct PlanSecurityEnhancer {
    security_types: HashSet<String>,
}

impl PlanSecurityEnhancer {
    pub fn new(api: &ApiDefinition) -> Self {
        Self {
            security_types: api
                .plans
                .iter()
                .map(|p| p.security.security_type.to_ascii_uppercase())
                .collect(),
        }
    }
}

impl AuthenticationHandlerEnhancer for PlanSecurityEnhancer {
    fn filter(&self, handlers: Vec<Arc<dyn AuthenticationHandler>>) -> Vec<Arc<dyn AuthenticationHandler>> {
        handlers
            .into_iter()
            .filter(|h| self.security_types.contains(&h.security_type().to_ascii_uppercase()))
            .collect()
    }
}

/// Handler set sorted once by ascending `order()`.
///
/// The sorted list is cached and only rebuilt by [`reload`](Self::reload).
/// An empty set is valid.
pub struct AuthenticationHandlerRegistry {
    source: Vec<Arc<dyn AuthenticationHandler>>,
    enhancer: Option<Arc<dyn AuthenticationHandlerEnhancer>>,
    handlers: RwLock<HandlerList>,
}

impl AuthenticationHandlerRegistry {
    pub fn new(source: Vec<Arc<dyn AuthenticationHandler>>) -> Self {
        let registry = Self {
            source,
            enhancer: None,
            handlers: RwLock::new(Arc::new(Vec::new())),
        };
        registry.reload();
        registry
    }

    pub fn with_enhancer(mut self, enhancer: Arc<dyn AuthenticationHandlerEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self.reload();
        self
    }

    /// Rebuild the cached, sorted list from the source handlers.
    pub fn reload(&self) {
        let mut handlers = self.source.clone();
        handlers.sort_by_key(|h| h.order());
        if let Some(enhancer) = &self.enhancer {
            handlers = enhancer.filter(handlers);
        }
        debug!(
            handlers = ?handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            "authentication handlers loaded"
        );
        *self.handlers.write() = Arc::new(handlers);
    }

    pub fn handlers(&self) -> HandlerList {
        self.handlers.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_kernel::{ApiType, AuthenticationPolicy, ExecutionContext, Plan};

    struct Fixed(&'static str, &'static str, i32);

    impl AuthenticationHandler for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn security_type(&self) -> &str {
            self.1
        }
        fn order(&self) -> i32 {
            self.2
        }
        fn can_handle(&self, _ctx: &ExecutionContext) -> bool {
            true
        }
        fn handle(&self, _ctx: &ExecutionContext) -> Vec<AuthenticationPolicy> {
            Vec::new()
        }
    }

    fn names(list: &HandlerList) -> Vec<&str> {
        list.iter().map(|h| h.name()).collect()
    }

    #[test]
    fn handlers_are_sorted_by_order() {
        let registry = AuthenticationHandlerRegistry::new(vec![
            Arc::new(Fixed("keyless", "KEY_LESS", 1000)),
            Arc::new(Fixed("jwt", "JWT", 0)),
            Arc::new(Fixed("api-key", "API_KEY", 500)),
        ]);
        assert_eq!(names(&registry.handlers()), vec!["jwt", "api-key", "keyless"]);
    }

    #[test]
    fn plan_enhancer_keeps_offered_security_types() {
        let api = ApiDefinition::new("api", "Api", ApiType::Proxy)
            .with_plan(Plan::new("p1", "api_key"))
            .with_plan(Plan::new("p2", "KEY_LESS"));
        let registry = AuthenticationHandlerRegistry::new(vec![
            Arc::new(Fixed("keyless", "KEY_LESS", 1000)),
            Arc::new(Fixed("jwt", "JWT", 0)),
            Arc::new(Fixed("api-key", "API_KEY", 500)),
        ])
        .with_enhancer(Arc::new(PlanSecurityEnhancer::new(&api)));
        assert_eq!(names(&registry.handlers()), vec!["api-key", "keyless"]);
    }

    #[test]
    fn empty_source_is_tolerated() {
        let registry = AuthenticationHandlerRegistry::new(Vec::new());
        registry.reload();
        assert!(registry.handlers().is_empty());
    }
}
