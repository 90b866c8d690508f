//! Connector resolution and the built-in connector plugins.

pub mod builtin;
mod endpoint;
mod entrypoint;

pub use endpoint::EndpointConnectorResolver;
pub use entrypoint::EntrypointConnectorResolver;
