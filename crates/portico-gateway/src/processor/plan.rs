use crate::condition::ConditionEvaluator;
use async_trait::async_trait;
use portico_kernel::context::ATTR_INTERNAL_ELIGIBLE_PLANS;
use portico_kernel::{ApiDefinition, ExecutionContext, GatewayResult, Processor};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Narrows the API plans to those whose selection rule accepts the request.
///
/// Plans without a rule are always eligible.  A rule that fails to evaluate
/// excludes its plan.  The security chain later binds the first eligible
/// plan matching the authenticated security type.
pub struct PlanResolverProcessor {
    plans: Vec<(String, Option<String>)>,
    evaluator: Arc<dyn ConditionEvaluator>,
}

impl PlanResolverProcessor {
    pub fn new(api: &ApiDefinition, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        let plans = api
            .plans
            .iter()
            .map(|p| {
                let rule = p.selection_rule.clone().filter(|r| !r.trim().is_empty());
                (p.id.clone(), rule)
            })
            .collect();
        Self { plans, evaluator }
    }
}

#[async_trait]
impl Processor for PlanResolverProcessor {
    fn id(&self) -> &str {
        "plan-resolver"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let variables = ctx.template_variables();
        let mut eligible = Vec::with_capacity(self.plans.len());
        for (plan, rule) in &self.plans {
            let accepted = match rule {
                None => true,
                Some(rule) => match self.evaluator.evaluate(rule, &variables, &Value::Null).await {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(plan = %plan, error = %err, "plan selection rule failed");
                        false
                    }
                },
            };
            if accepted {
                eligible.push(plan.clone());
            }
        }
        ctx.set_internal_attr(ATTR_INTERNAL_ELIGIBLE_PLANS, &eligible);
        Ok(())
    }
}
