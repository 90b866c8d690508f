//! End-to-end tests driving the axum app through `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use portico_gateway::config::GatewayConfig;
use portico_gateway::manager::ApiManager;
use portico_gateway::node::Node;
use portico_gateway::reactor::ReactorServices;
use portico_gateway::registry::InMemoryPluginRegistry;
use portico_gateway::server::GatewayServer;
use portico_kernel::{
    ApiDefinition, ApiType, EndpointGroup, Entrypoint, GatewayResult, Listener, Metrics, Plan,
    ReactableEvent, Reporter,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

#[derive(Default)]
struct CountingReporter(AtomicUsize);

#[async_trait]
impl Reporter for CountingReporter {
    fn id(&self) -> &str {
        "counting"
    }

    async fn report(&self, _metrics: &Metrics) -> GatewayResult<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Gateway {
    app: Router,
    manager: Arc<ApiManager>,
    reporter: Arc<CountingReporter>,
}

async fn gateway(config: GatewayConfig, apis: Vec<ApiDefinition>) -> Gateway {
    let config = Arc::new(config);
    let node = Arc::new(Node::new());
    let services = ReactorServices::new(
        config.clone(),
        node.clone(),
        Arc::new(InMemoryPluginRegistry::with_builtins()),
    );
    let manager = Arc::new(ApiManager::new(services));
    for api in apis {
        manager.handle(ReactableEvent::Deploy(api)).await.unwrap();
    }
    let reporter = Arc::new(CountingReporter::default());
    let reporters: Vec<Arc<dyn Reporter>> = vec![reporter.clone()];
    let app = GatewayServer::new(config, node, manager.clone())
        .with_reporters(reporters)
        .build_app();
    Gateway {
        app,
        manager,
        reporter,
    }
}

fn proxy_api(id: &str, path: &str, plan: Plan) -> ApiDefinition {
    ApiDefinition::new(id, id, ApiType::Proxy)
        .with_listener(Listener::http(path).with_entrypoint(Entrypoint::new("http-proxy")))
        .with_endpoint_group(
            EndpointGroup::new("default", "mock").with_endpoint("e1", json!({ "content": "hello" })),
        )
        .with_plan(plan)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8_lossy(&body).into_owned())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn proxies_to_mock_endpoint() {
    let gw = gateway(
        GatewayConfig::default(),
        vec![proxy_api("echo", "/echo", Plan::new("open", "KEY_LESS"))],
    )
    .await;

    let (status, headers, body) = send(&gw.app, get("/echo/anything?x=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello");

    let transaction = headers["x-gravitee-transaction-id"].to_str().unwrap();
    let request = headers["x-gravitee-request-id"].to_str().unwrap();
    assert_eq!(transaction, request);
    assert_eq!(gw.reporter.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transaction_id_is_propagated() {
    let gw = gateway(
        GatewayConfig::default(),
        vec![proxy_api("echo", "/echo", Plan::new("open", "KEY_LESS"))],
    )
    .await;

    let request = Request::builder()
        .uri("/echo")
        .header("X-Gravitee-Transaction-Id", "tx-42")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = send(&gw.app, request).await;
    assert_eq!(headers["x-gravitee-transaction-id"], "tx-42");
    assert_ne!(headers["x-gravitee-request-id"], "tx-42");
}

#[tokio::test]
async fn unknown_context_path_is_404() {
    let gw = gateway(
        GatewayConfig::default(),
        vec![proxy_api("echo", "/echo", Plan::new("open", "KEY_LESS"))],
    )
    .await;

    let (status, _, body) = send(&gw.app, get("/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "No context-path matches the request URI.");
    assert_eq!(gw.reporter.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn api_key_plan_guards_the_api() {
    let plan = {
        let mut plan = Plan::new("gold", "API_KEY");
        plan.security.configuration = json!({ "keys": ["s3cr3t"] });
        plan
    };
    let gw = gateway(GatewayConfig::default(), vec![proxy_api("guarded", "/guarded", plan)]).await;

    let (status, headers, body) = send(&gw.app, get("/guarded")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers["content-type"], "application/json");
    let error: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(error["http_status_code"], 401);

    let request = Request::builder()
        .uri("/guarded")
        .header("X-Gravitee-Api-Key", "s3cr3t")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&gw.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello");

    let (status, _, _) = send(&gw.app, get("/guarded?api-key=wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn http_get_serves_generated_messages() {
    let api = ApiDefinition::new("feed", "Feed", ApiType::Message)
        .with_listener(
            Listener::http("/feed").with_entrypoint(
                Entrypoint::new("http-get").with_configuration(json!({ "messagesLimitDurationMs": 1000 })),
            ),
        )
        .with_endpoint_group(EndpointGroup::new("default", "mock").with_endpoint(
            "e1",
            json!({ "messageContent": "tick", "messageCount": 3, "messageIntervalMs": 0 }),
        ))
        .with_plan(Plan::new("open", "KEY_LESS"));
    let gw = gateway(GatewayConfig::default(), vec![api]).await;

    let request = Request::builder()
        .uri("/feed")
        .header("Accept", "application/json")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&gw.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/json");

    let payload: Value = serde_json::from_str(&body).unwrap();
    let items = payload["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["content"], "tick");
    assert_eq!(payload["pagination"]["nextCursor"], "2");
}

#[tokio::test]
async fn undeployed_api_is_no_longer_routed() {
    let gw = gateway(
        GatewayConfig::default(),
        vec![proxy_api("echo", "/echo", Plan::new("open", "KEY_LESS"))],
    )
    .await;
    gw.manager
        .handle(ReactableEvent::Undeploy("echo".to_string()))
        .await
        .unwrap();

    let (status, _, _) = send(&gw.app, get("/echo")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn extension_methods_are_not_allowed() {
    let gw = gateway(GatewayConfig::default(), Vec::new()).await;
    let request = Request::builder()
        .method("PURGE")
        .uri("/echo")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&gw.app, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn api_definition_files_are_deployable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("echo.yml");
    std::fs::write(
        &path,
        r#"
id: echo
name: Echo
type: proxy
listeners:
  - type: http
    paths: ["/echo"]
    entrypoints:
      - type: http-proxy
endpoint_groups:
  - name: default
    type: mock
    endpoints:
      - name: e1
        configuration:
          content: from-file
plans:
  - id: open
    security:
      type: KEY_LESS
"#,
    )
    .unwrap();

    let config = GatewayConfig {
        apis: vec![path.to_string_lossy().into_owned()],
        ..GatewayConfig::default()
    };
    let apis = config.api_definitions().unwrap();
    let gw = gateway(config, apis).await;

    let (status, _, body) = send(&gw.app, get("/echo")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "from-file");
}
