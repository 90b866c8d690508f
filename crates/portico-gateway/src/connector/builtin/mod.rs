//! Connector plugins shipped with the gateway.
//!
//! | id           | kind       | role                                         |
//! |--------------|------------|----------------------------------------------|
//! | `http-proxy` | entrypoint | plain request/response proxying              |
//! | `http-get`   | entrypoint | subscribe: batches outgoing messages         |
//! | `http-post`  | entrypoint | publish: request body as one message         |
//! | `http-proxy` | endpoint   | forwards to an upstream HTTP target          |
//! | `mock`       | endpoint   | canned response or generated message stream |

mod http_get;
mod http_post;
mod http_proxy;
mod mock;

pub use http_get::{HttpGetEntrypoint, HttpGetEntrypointFactory};
pub use http_post::{HttpPostEntrypoint, HttpPostEntrypointFactory};
pub use http_proxy::{
    HttpProxyEndpoint, HttpProxyEndpointFactory, HttpProxyEntrypoint, HttpProxyEntrypointFactory,
};
pub use mock::{MockEndpoint, MockEndpointFactory};

use portico_kernel::{GatewayError, GatewayResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode a plugin configuration; `null` yields the defaults.
pub(crate) fn parse_configuration<T: DeserializeOwned + Default>(
    plugin: &str,
    configuration: &Value,
) -> GatewayResult<T> {
    if configuration.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(configuration.clone())
        .map_err(|e| GatewayError::Plugin(format!("invalid '{plugin}' configuration: {e}")))
}
