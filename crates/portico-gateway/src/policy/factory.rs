//! Memoizing policy factory.

use super::conditional::ConditionalPolicy;
use super::legacy::LegacyPolicyAdapter;
use crate::condition::ConditionEvaluator;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use portico_kernel::{
    ExecutionPhase, GatewayError, GatewayResult, Policy, PolicyManifest, PolicyPlugin,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Memoization key: one instance per phase, manifest, configuration and
/// condition.  The configuration is held in its canonical JSON text
/// (object keys sorted).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PolicyKey {
    phase: ExecutionPhase,
    manifest: String,
    configuration: String,
    condition: Option<String>,
}

/// Creates policy instances and memoizes them for the lifetime of the
/// owning deployment.
///
/// Lookups of an already created instance only take a shard read lock.
/// First creation happens under the shard write lock of the key's entry,
/// so concurrent callers receive the single winner's instance and plugin
/// factories are never asked twice for the same key.  Plugin factories
/// must not call back into this factory from `create`.
pub struct DefaultPolicyFactory {
    evaluator: Arc<dyn ConditionEvaluator>,
    policies: DashMap<PolicyKey, Arc<dyn Policy>>,
}

impl DefaultPolicyFactory {
    pub fn new(evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        Self {
            evaluator,
            policies: DashMap::new(),
        }
    }

    /// Get or create the policy bound to `(phase, manifest, configuration,
    /// condition)`.  A blank condition is no condition.
    pub fn create(
        &self,
        phase: ExecutionPhase,
        manifest: &PolicyManifest,
        configuration: &Value,
        condition: Option<&str>,
    ) -> GatewayResult<Arc<dyn Policy>> {
        let condition = condition.map(str::trim).filter(|c| !c.is_empty());
        let key = PolicyKey {
            phase,
            manifest: manifest.id.clone(),
            configuration: canonical_json(configuration),
            condition: condition.map(str::to_string),
        };

        if let Some(policy) = self.policies.get(&key) {
            return Ok(policy.clone());
        }

        match self.policies.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let policy = self.build(phase, manifest, configuration, condition)?;
                debug!(policy = %manifest.id, phase = %phase, conditional = condition.is_some(), "policy instantiated");
                entry.insert(policy.clone());
                Ok(policy)
            }
        }
    }

    fn build(
        &self,
        phase: ExecutionPhase,
        manifest: &PolicyManifest,
        configuration: &Value,
        condition: Option<&str>,
    ) -> GatewayResult<Arc<dyn Policy>> {
        let policy: Arc<dyn Policy> = match &manifest.plugin {
            PolicyPlugin::Native(factory) => factory.create(configuration)?,
            PolicyPlugin::Legacy(factory) => {
                if phase.is_async() {
                    return Err(GatewayError::LegacyPolicyPhase {
                        policy: manifest.id.clone(),
                        phase,
                    });
                }
                Arc::new(LegacyPolicyAdapter::new(factory.create(configuration)?))
            }
        };

        Ok(match condition {
            Some(condition) => Arc::new(ConditionalPolicy::new(
                policy,
                condition,
                self.evaluator.clone(),
            )),
            None => policy,
        })
    }

    /// Drop every instance of `manifest` and let its plugin release
    /// resources.  Safe when nothing was ever created.
    pub fn cleanup(&self, manifest: &PolicyManifest) {
        self.policies.retain(|key, _| key.manifest != manifest.id);
        manifest.plugin.cleanup();
    }

    /// Number of memoized instances.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// JSON text with object keys sorted at every level, whatever the map
/// ordering `serde_json` was built with.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}
