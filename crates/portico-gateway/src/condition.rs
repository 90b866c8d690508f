//! Guard evaluation for conditional policies and plan selection rules.

use crate::el::Expression;
use async_trait::async_trait;
use dashmap::DashMap;
use portico_kernel::{GatewayError, GatewayResult};
use serde_json::Value;
use std::sync::Arc;

/// Evaluates a boolean guard against a JSON view of the context.
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    /// `subject` is the object bare identifiers resolve on (for a
    /// conditional policy: the decorator, exposing `condition` and `id`).
    async fn evaluate(
        &self,
        condition: &str,
        variables: &Value,
        subject: &Value,
    ) -> GatewayResult<bool>;
}

/// [`ConditionEvaluator`] backed by the gateway expression language.
///
/// Parsed expressions are cached by source text.
#[derive(Default)]
pub struct ExpressionConditionEvaluator {
    cache: DashMap<String, Arc<Expression>>,
}

impl ExpressionConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn expression(&self, condition: &str) -> GatewayResult<Arc<Expression>> {
        if let Some(expr) = self.cache.get(condition) {
            return Ok(expr.clone());
        }
        let parsed = Expression::parse(condition)
            .map_err(|e| GatewayError::Condition(format!("'{condition}': {e}")))?;
        Ok(self
            .cache
            .entry(condition.to_string())
            .or_insert_with(|| Arc::new(parsed))
            .clone())
    }
}

#[async_trait]
impl ConditionEvaluator for ExpressionConditionEvaluator {
    async fn evaluate(
        &self,
        condition: &str,
        variables: &Value,
        subject: &Value,
    ) -> GatewayResult<bool> {
        self.expression(condition)?
            .evaluate_bool(variables, subject)
            .map_err(|e| GatewayError::Condition(e.to_string()))
    }
}
