//! `http-proxy` entrypoint and endpoint.

use super::parse_configuration;
use async_trait::async_trait;
use portico_kernel::{
    ApiType, ConnectorKind, ConnectorMode, DeploymentContext, EndpointConnector,
    EndpointConnectorFactory, EntrypointConnector, EntrypointConnectorFactory, ExecutionContext,
    ExecutionFailure, GatewayError, GatewayResult, ListenerType, Qos,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const MODES: &[ConnectorMode] = &[ConnectorMode::RequestResponse];

/// Headers that describe a single hop and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "proxy-connection",
];

// ─────────────────────────────────────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts every request reaching its listener; the request and response
/// are handed over as they are.
pub struct HttpProxyEntrypoint;

#[async_trait]
impl EntrypointConnector for HttpProxyEntrypoint {
    fn id(&self) -> &str {
        "http-proxy"
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Proxy
    }

    fn supported_listener_type(&self) -> ListenerType {
        ListenerType::Http
    }

    fn supported_api_type(&self) -> ApiType {
        ApiType::Proxy
    }

    fn supported_modes(&self) -> &[ConnectorMode] {
        MODES
    }

    fn matches(&self, _ctx: &ExecutionContext) -> bool {
        true
    }

    async fn handle_request(&self, _ctx: &mut ExecutionContext) -> GatewayResult<()> {
        Ok(())
    }

    async fn handle_response(&self, _ctx: &mut ExecutionContext) -> GatewayResult<()> {
        Ok(())
    }
}

pub struct HttpProxyEntrypointFactory;

impl EntrypointConnectorFactory for HttpProxyEntrypointFactory {
    fn id(&self) -> &str {
        "http-proxy"
    }

    fn supported_api_type(&self) -> ApiType {
        ApiType::Proxy
    }

    fn create(
        &self,
        _configuration: &Value,
        _qos: Option<Qos>,
        _deployment: &DeploymentContext,
    ) -> GatewayResult<Arc<dyn EntrypointConnector>> {
        Ok(Arc::new(HttpProxyEntrypoint))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoint
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EndpointConfiguration {
    target: String,
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SharedConfiguration {
    connect_timeout_ms: u64,
    read_timeout_ms: u64,
}

impl Default for SharedConfiguration {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3_000,
            read_timeout_ms: 10_000,
        }
    }
}

/// Forwards the request to `target` + path info + query string.
pub struct HttpProxyEndpoint {
    target: String,
    client: Client,
}

impl HttpProxyEndpoint {
    fn url(&self, ctx: &ExecutionContext) -> String {
        let mut url = if ctx.request.path_info == "/" {
            self.target.clone()
        } else {
            format!("{}{}", self.target.trim_end_matches('/'), ctx.request.path_info)
        };
        if let Some(query) = ctx.request.query() {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

#[async_trait]
impl EndpointConnector for HttpProxyEndpoint {
    fn id(&self) -> &str {
        "http-proxy"
    }

    fn supported_api_type(&self) -> ApiType {
        ApiType::Proxy
    }

    fn supported_modes(&self) -> &[ConnectorMode] {
        MODES
    }

    async fn connect(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let url = self.url(ctx);
        debug!(url = %url, "forwarding to upstream");

        let method = reqwest::Method::from_bytes(ctx.request.method.as_str().as_bytes())
            .map_err(|e| GatewayError::Connector(e.to_string()))?;
        let mut builder = self.client.request(method, &url);
        for (name, value) in ctx.request.headers.iter() {
            if HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name)) {
                continue;
            }
            builder = builder.header(name, value);
        }
        if !ctx.request.body.is_empty() {
            builder = builder.body(ctx.request.body.clone());
        }

        let started = Instant::now();
        let upstream = builder.send().await.map_err(|e| client_failure(&e))?;
        ctx.metrics.endpoint = Some(url);

        ctx.response.status = upstream.status().as_u16();
        ctx.response.reason = upstream.status().canonical_reason().map(str::to_string);
        for (name, value) in upstream.headers() {
            if HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name.as_str())) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                ctx.response.headers.add(name.as_str(), value);
            }
        }
        let body = upstream.bytes().await.map_err(|e| client_failure(&e))?;
        ctx.response.set_body(body);
        ctx.metrics.endpoint_response_time_ms =
            Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
        Ok(())
    }
}

fn client_failure(err: &reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::failure(
            ExecutionFailure::new(504)
                .key("REQUEST_TIMEOUT")
                .message("Request timeout"),
        )
    } else {
        GatewayError::failure(
            ExecutionFailure::new(502)
                .key("GATEWAY_CLIENT_CONNECTION_ERROR")
                .message(err.to_string()),
        )
    }
}

pub struct HttpProxyEndpointFactory;

impl EndpointConnectorFactory for HttpProxyEndpointFactory {
    fn id(&self) -> &str {
        "http-proxy"
    }

    fn supported_api_type(&self) -> ApiType {
        ApiType::Proxy
    }

    fn create(
        &self,
        configuration: &Value,
        shared_configuration: &Value,
        _deployment: &DeploymentContext,
    ) -> GatewayResult<Arc<dyn EndpointConnector>> {
        let endpoint: EndpointConfiguration = parse_configuration("http-proxy", configuration)?;
        if endpoint.target.is_empty() {
            return Err(GatewayError::Plugin("http-proxy endpoint requires a target".into()));
        }
        let shared: SharedConfiguration = parse_configuration("http-proxy", shared_configuration)?;
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(shared.connect_timeout_ms))
            .timeout(Duration::from_millis(shared.read_timeout_ms))
            .build()
            .map_err(|e| GatewayError::Plugin(format!("unable to build http client: {e}")))?;
        Ok(Arc::new(HttpProxyEndpoint {
            target: endpoint.target,
            client,
        }))
    }
}
