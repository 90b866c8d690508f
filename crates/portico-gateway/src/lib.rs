//! `portico-gateway`: the Portico API gateway runtime.
//!
//! Concrete implementations of the contracts defined in `portico-kernel`:
//!
//! | Kernel contract | Implementation |
//! |-----------------|----------------|
//! | [`PolicyPluginFactory`] / [`Policy`] | [`policy::DefaultPolicyFactory`], [`policy::PolicyChain`] |
//! | [`EntrypointConnector`] / [`EndpointConnector`] | [`connector`] resolvers and built-in connectors |
//! | [`AuthenticationHandler`] | [`security::ApiKeyAuthenticationHandler`], [`security::KeylessAuthenticationHandler`] |
//! | [`Processor`] | [`processor`] chains (platform, API, not-found) |
//! | [`Reporter`] | [`reporter::LogReporter`] |
//! | [`PluginRegistry`] | [`registry::InMemoryPluginRegistry`] |
//!
//! An [`reactor::ApiReactor`] runs one deployed API; the
//! [`manager::ApiManager`] deploys reactors and routes by context path; the
//! [`server::GatewayServer`] puts an axum HTTP service in front of it.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use portico_gateway::config::GatewayConfig;
//! use portico_gateway::manager::ApiManager;
//! use portico_gateway::node::Node;
//! use portico_gateway::reactor::ReactorServices;
//! use portico_gateway::registry::InMemoryPluginRegistry;
//! use portico_gateway::server::GatewayServer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(GatewayConfig::load(Some("gateway.yml"))?);
//!     let node = Arc::new(Node::new());
//!     let services = ReactorServices::new(
//!         config.clone(),
//!         node.clone(),
//!         Arc::new(InMemoryPluginRegistry::with_builtins()),
//!     );
//!     let manager = Arc::new(ApiManager::new(services));
//!     for api in config.api_definitions()? {
//!         manager.deploy(api).await?;
//!     }
//!     GatewayServer::new(config, node, manager).start().await?;
//!     Ok(())
//! }
//! ```
//!
//! [`PolicyPluginFactory`]: portico_kernel::PolicyPluginFactory
//! [`Policy`]: portico_kernel::Policy
//! [`EntrypointConnector`]: portico_kernel::EntrypointConnector
//! [`EndpointConnector`]: portico_kernel::EndpointConnector
//! [`AuthenticationHandler`]: portico_kernel::AuthenticationHandler
//! [`Processor`]: portico_kernel::Processor
//! [`Reporter`]: portico_kernel::Reporter
//! [`PluginRegistry`]: portico_kernel::PluginRegistry

pub mod accept;
pub mod condition;
pub mod config;
pub mod connector;
pub mod el;
pub mod error;
pub mod hook;
pub mod manager;
pub mod node;
pub mod policy;
pub mod processor;
pub mod reactor;
pub mod registry;
pub mod reporter;
pub mod routing;
pub mod security;
pub mod server;

pub use error::{DeployError, StartupError};
