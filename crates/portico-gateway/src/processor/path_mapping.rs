use crate::routing::PathPattern;
use async_trait::async_trait;
use portico_kernel::{ExecutionContext, GatewayResult, Processor};

/// Records the first path mapping matching the request path info, so
/// analytics can group requests by route template.
pub struct PathMappingProcessor {
    mappings: Vec<PathPattern>,
}

impl PathMappingProcessor {
    pub fn new<'a>(mappings: impl IntoIterator<Item = &'a String>) -> Self {
        Self {
            mappings: mappings.into_iter().map(PathPattern::new).collect(),
        }
    }
}

#[async_trait]
impl Processor for PathMappingProcessor {
    fn id(&self) -> &str {
        "path-mapping"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        ctx.metrics.mapped_path = self
            .mappings
            .iter()
            .find(|m| m.match_path(&ctx.request.path_info).is_some())
            .map(|m| m.source().to_string());
        Ok(())
    }
}
