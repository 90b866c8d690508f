//! Portico gateway entry point.
//!
//! Loads the node configuration, deploys the configured APIs and starts the
//! axum HTTP service.
//!
//! # Configuration
//!
//! | Source | Description |
//! |--------|-------------|
//! | first CLI argument / `PORTICO_CONFIG` | Path of the YAML / TOML / JSON configuration file (optional). |
//! | `PORTICO__*` | Overrides, e.g. `PORTICO__HTTP__PORT=9000`. |
//! | `RUST_LOG` | Log filter; falls back to `logging.filter`, then `portico_gateway=info`. |

use portico_gateway::StartupError;
use portico_gateway::config::GatewayConfig;
use portico_gateway::manager::ApiManager;
use portico_gateway::node::Node;
use portico_gateway::reactor::ReactorServices;
use portico_gateway::registry::InMemoryPluginRegistry;
use portico_gateway::reporter::LogReporter;
use portico_gateway::server::GatewayServer;
use portico_kernel::Reporter;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "portico_gateway=info,portico::report=info";

#[tokio::main]
async fn main() {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PORTICO_CONFIG").ok());

    let config = match GatewayConfig::load(path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            // Logging is not configured yet.
            eprintln!("portico: {err}");
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    if let Err(err) = run(config).await {
        error!(error = %err, "gateway failed");
        std::process::exit(1);
    }
}

fn init_tracing(config: &GatewayConfig) {
    let fallback = config.logging.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    let config = Arc::new(config);
    let node = Arc::new(Node::new());
    info!(node = node.id(), "Portico node initialising");

    let services = ReactorServices::new(
        config.clone(),
        node.clone(),
        Arc::new(InMemoryPluginRegistry::with_builtins()),
    );
    let manager = Arc::new(ApiManager::new(services));
    for api in config.api_definitions()? {
        manager.deploy(api).await?;
    }

    let reporters: Vec<Arc<dyn Reporter>> = vec![Arc::new(LogReporter::new())];
    GatewayServer::new(config, node, manager)
        .with_reporters(reporters)
        .start()
        .await?;
    Ok(())
}
