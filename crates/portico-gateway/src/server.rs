//! Axum-based HTTP gateway server.
//!
//! [`GatewayServer`] owns the platform processor chains and dispatches every
//! inbound request to the [`ApiManager`]:
//!
//! ```text
//! platform pre chain ─► route by context path ─┬─► ApiReactor ─► platform post chain
//!                                              └─► not-found chain
//! ```
//!
//! There are no fixed routes: a single fallback handler serves every path.

use crate::config::GatewayConfig;
use crate::manager::ApiManager;
use crate::node::Node;
use crate::processor::{
    NotFoundProcessorChainFactory, PlatformProcessorChainFactory, ProcessorChain,
};
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{ConnectInfo, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use portico_kernel::{
    AlertEventProducer, ExecutionContext, HttpMethod, ListenerType, Reporter, Request,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into the handler via [`State`] extractor.
#[derive(Clone)]
pub struct AppState {
    manager: Arc<ApiManager>,
    platform_pre: Arc<ProcessorChain>,
    platform_post: Arc<ProcessorChain>,
    not_found: Arc<ProcessorChain>,
}

impl AppState {
    async fn dispatch(&self, ctx: &mut ExecutionContext) {
        if let Err(err) = self.platform_pre.execute(ctx).await {
            if !err.is_interruption() {
                error!(request_id = %ctx.request.id, error = %err, "platform pre chain failed");
                let failure = err.to_failure();
                ctx.response.status = failure.status_code;
                ctx.response.headers.set("Content-Type", "text/plain");
                ctx.response.set_body(failure.message.unwrap_or_default());
            }
            self.run_platform_post(ctx).await;
            return;
        }

        match self.manager.route(&ctx.request.path) {
            Some((context_path, reactor)) => {
                ctx.request.bind_context_path(&context_path);
                reactor.handle(ctx).await;
                self.run_platform_post(ctx).await;
            }
            None => {
                if let Err(err) = self.not_found.execute(ctx).await {
                    warn!(request_id = %ctx.request.id, error = %err, "not-found chain failed");
                }
            }
        }
    }

    async fn run_platform_post(&self, ctx: &mut ExecutionContext) {
        if let Err(err) = self.platform_post.execute(ctx).await {
            warn!(request_id = %ctx.request.id, error = %err, "platform post chain failed");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayServer
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP front of a gateway node.
pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    node: Arc<Node>,
    manager: Arc<ApiManager>,
    reporters: Vec<Arc<dyn Reporter>>,
    alert_producer: Option<Arc<dyn AlertEventProducer>>,
}

impl GatewayServer {
    pub fn new(config: Arc<GatewayConfig>, node: Arc<Node>, manager: Arc<ApiManager>) -> Self {
        Self {
            config,
            node,
            manager,
            reporters: Vec::new(),
            alert_producer: None,
        }
    }

    pub fn with_reporters(mut self, reporters: Vec<Arc<dyn Reporter>>) -> Self {
        self.reporters = reporters;
        self
    }

    pub fn with_alert_producer(mut self, producer: Arc<dyn AlertEventProducer>) -> Self {
        self.alert_producer = Some(producer);
        self
    }

    pub fn manager(&self) -> &Arc<ApiManager> {
        &self.manager
    }

    /// Build the axum [`Router`].  Call [`start()`](Self::start) to bind and
    /// serve.
    pub fn build_app(&self) -> Router {
        let mut platform = PlatformProcessorChainFactory::new(self.config.clone(), self.node.clone())
            .with_reporters(self.reporters.clone());
        if let Some(producer) = &self.alert_producer {
            platform = platform.with_alert_producer(producer.clone());
        }
        let not_found = NotFoundProcessorChainFactory::new(self.config.clone(), self.reporters.clone());

        let state = AppState {
            manager: self.manager.clone(),
            platform_pre: Arc::new(platform.pre_chain()),
            platform_post: Arc::new(platform.post_chain()),
            not_found: Arc::new(not_found.chain()),
        };

        Router::new().fallback(gateway_handler).with_state(state)
    }

    /// Bind to `0.0.0.0:{http.port}` and serve until ctrl-c / SIGTERM, then
    /// undeploy every API.
    pub async fn start(self) -> std::io::Result<()> {
        let app = self.build_app();
        let addr = format!("0.0.0.0:{}", self.config.http.port);
        info!(addr = %addr, node = self.node.id(), apis = ?self.manager.apis(), "Portico gateway starting");
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        let node = self.node.clone();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                node.begin_shutdown();
                info!("shutdown requested, draining connections");
            })
            .await?;

        self.manager.stop().await;
        info!("Portico gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn gateway_handler(State(state): State<AppState>, request: axum::extract::Request) -> Response {
    let (parts, body) = request.into_parts();

    let Some(method) = axum_method_to_kernel(&parts.method) else {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            format!("method '{}' is not supported", parts.method),
        )
            .into_response();
    };
    let body = match to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "failed to read request body");
            return (StatusCode::BAD_REQUEST, "Unable to read request body").into_response();
        }
    };

    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let mut request = Request::new(Uuid::new_v4().to_string(), method, uri);
    for (name, value) in &parts.headers {
        if let Ok(v) = value.to_str() {
            request.headers.add(name.as_str(), v);
        }
    }
    request.body = body;
    if let Some(host) = request.headers.get("host").map(str::to_string) {
        request.original_url = format!("{}://{}{}", request.scheme, host, request.uri);
        request.host = host;
    }
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        request.remote_address = addr.ip().to_string();
    }

    let mut ctx = ExecutionContext::new(request);
    ctx.set_listener_type(ListenerType::Http);
    state.dispatch(&mut ctx).await;

    build_axum_response(ctx.response)
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Convert an axum [`Method`] to the kernel [`HttpMethod`].
///
/// Returns `None` for extension methods; callers respond with
/// `405 Method Not Allowed`.
fn axum_method_to_kernel(m: &Method) -> Option<HttpMethod> {
    match m.as_str() {
        "GET"     => Some(HttpMethod::Get),
        "POST"    => Some(HttpMethod::Post),
        "PUT"     => Some(HttpMethod::Put),
        "PATCH"   => Some(HttpMethod::Patch),
        "DELETE"  => Some(HttpMethod::Delete),
        "HEAD"    => Some(HttpMethod::Head),
        "OPTIONS" => Some(HttpMethod::Options),
        "TRACE"   => Some(HttpMethod::Trace),
        "CONNECT" => Some(HttpMethod::Connect),
        _         => None,
    }
}

/// Remaining response messages are streamed as the body.
fn build_axum_response(mut resp: portico_kernel::Response) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    for (name, value) in resp.headers.iter() {
        builder = builder.header(name, value);
    }
    let body = match resp.messages.take() {
        Some(flow) => Body::from_stream(flow.map(|item| item.map(|message| message.content))),
        None => Body::from(resp.body),
    };
    builder.body(body).unwrap_or_else(|err| {
        error!(error = %err, "invalid response from pipeline");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}
