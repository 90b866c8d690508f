//! Cross-cutting request/response processors and their chains.
//!
//! | Chain          | Processors                                                        |
//! |----------------|-------------------------------------------------------------------|
//! | platform pre   | metrics, [x-forward-for], transaction, [trace-context]            |
//! | API pre        | [x-forwarded-prefix], [cors-preflight], [log-request], plan-resolver |
//! | API post       | shutdown, [cors-simple-request], [log-response], [path-mapping]   |
//! | API error      | shutdown, response-template, [log-response]                       |
//! | platform post  | response-time, [reporter], [alert]                                |
//! | not found      | not-found, response-time, [reporter]                              |

mod chain;
pub mod cors;
mod factory;
pub mod forward;
mod logging;
mod metrics;
mod not_found;
mod path_mapping;
mod plan;
mod report;
mod shutdown;
pub mod template;
pub mod trace_context;
mod transaction;

pub use chain::ProcessorChain;
pub use cors::{CorsPreflightProcessor, CorsSimpleRequestProcessor};
pub use factory::{
    ApiProcessorChainFactory, NotFoundProcessorChainFactory, PlatformProcessorChainFactory,
};
pub use forward::{XForwardForProcessor, XForwardedPrefixProcessor};
pub use logging::{LogRequestProcessor, LogResponseProcessor};
pub use metrics::{MetricsProcessor, ResponseTimeProcessor};
pub use not_found::{NOT_FOUND_MESSAGE, NotFoundProcessor};
pub use path_mapping::PathMappingProcessor;
pub use plan::PlanResolverProcessor;
pub use report::{AlertProcessor, ReporterProcessor};
pub use shutdown::ShutdownProcessor;
pub use template::ResponseTemplateProcessor;
pub use trace_context::TraceContextProcessor;
pub use transaction::TransactionProcessor;
