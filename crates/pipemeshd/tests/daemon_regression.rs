//! Daemon regression tests.
//!
//! Drives the manager and gateway routers end to end the way sidecars,
//! operators and clients call them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use pipemesh_api::{GatewayState, ManagerState, gateway_router, manager_router};
use pipemesh_core::{HttpReply, TraceHeaders};
use pipemesh_mesh::MeshConfigGenerator;
use pipemesh_pipeline::{
    Dispatcher, DispatcherConfig, Envelope, EnvelopeSender, HopClient, PipelineCatalog,
    PipelineResult, Stage,
};
use pipemesh_registry::{RuntimeRegistry, ServiceRegistry, StoreDriver};
use pipemesh_state::*;

fn manager_state() -> ManagerState {
    let store = StateStore::open_in_memory().unwrap();
    let driver = StoreDriver::new(store.clone());
    ManagerState {
        store,
        registry: Arc::new(RuntimeRegistry::new(Arc::new(driver.clone()))),
        driver,
        services: Arc::new(ServiceRegistry::new()),
        generator: MeshConfigGenerator::new("gateway", 250),
        self_service_id: "manager-1".to_string(),
        health_timeout: Duration::from_millis(200),
        exposed_host: "10.1.0.1".to_string(),
        exposed_port: 9090,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn deploy(router: &Router, name: &str, kind: &str, app_port: u16) -> String {
    let (status, body) = send(
        router,
        "POST",
        "/api/v1/runtime",
        Some(json!({"name": name, "kind": kind, "app_port": app_port})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn register(router: &Router, runtime_id: &str, instance_id: &str, host: &str, port: u16) {
    let (status, _) = send(
        router,
        "PUT",
        "/api/v1/runtime/instances",
        Some(json!({
            "id": instance_id,
            "runtime_id": runtime_id,
            "host": host,
            "port": port,
            "status": "UP",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn manager_health_endpoint() {
    let router = manager_router(manager_state());
    let (status, body) = send(&router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn model_node_sees_every_cluster_and_gateway_route() {
    let router = manager_router(manager_state());
    let gateway_id = deploy(&router, "gateway", "gateway", 9000).await;
    let iris_id = deploy(&router, "iris", "model", 9090).await;
    deploy(&router, "scorer", "model", 9091).await;
    register(&router, &gateway_id, "gw-1", "10.0.0.2", 9000).await;
    register(&router, &iris_id, "iris-1", "10.0.0.3", 9001).await;

    let (status, clusters) = send(&router, "GET", "/v1/clusters/static/iris-1", None).await;
    assert_eq!(status, StatusCode::OK);
    let clusters = clusters["clusters"].as_array().unwrap();
    // Three runtime clusters plus one per live gateway instance.
    assert_eq!(clusters.len(), 4);
    let own = clusters.iter().find(|c| c["name"] == "iris").unwrap();
    assert_eq!(own["type"], "static");
    assert_eq!(own["hosts"][0]["url"], "tcp://127.0.0.1:9090");
    let gateway_cluster = stable_name("gw-1");
    let gw = clusters.iter().find(|c| c["name"] == gateway_cluster.as_str()).unwrap();
    assert_eq!(gw["hosts"][0]["url"], "tcp://10.0.0.2:9000");

    let (status, routes) = send(&router, "GET", "/v1/routes/local/static/iris-1", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = routes["virtual_hosts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"gateway"));
    assert!(names.contains(&"scorer"));
    assert!(names.contains(&gateway_cluster.as_str()));
    assert!(!names.contains(&"iris"));
    assert_eq!(names.last(), Some(&"all"));
}

#[tokio::test]
async fn discovery_documents_are_stable_between_calls() {
    let router = manager_router(manager_state());
    let gateway_id = deploy(&router, "gateway", "gateway", 9000).await;
    let iris_id = deploy(&router, "iris", "model", 9090).await;
    register(&router, &gateway_id, "gw-1", "10.0.0.2", 9000).await;
    register(&router, &iris_id, "iris-1", "10.0.0.3", 9001).await;

    let (_, first) = send(&router, "GET", "/v1/clusters/static/iris-1", None).await;
    let (_, second) = send(&router, "GET", "/v1/clusters/static/iris-1", None).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn pipeline_management_round_trip() {
    let router = manager_router(manager_state());
    let pipeline = json!({"name": "fraud", "transport": "grpc", "chain": ["iris", "scorer/v2"]});

    let (status, _) = send(&router, "POST", "/api/v1/pipelines", Some(pipeline.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&router, "GET", "/api/v1/pipelines", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0], pipeline);

    let (status, _) = send(&router, "DELETE", "/api/v1/pipelines/fraud", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, "GET", "/api/v1/pipelines/fraud", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn deleting_a_runtime_drops_its_instances() {
    let router = manager_router(manager_state());
    let iris_id = deploy(&router, "iris", "model", 9090).await;
    register(&router, &iris_id, "iris-1", "10.0.0.3", 9001).await;

    let (status, body) = send(&router, "GET", "/api/v1/runtime/instances/iris", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(&router, "DELETE", "/api/v1/runtime/iris", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, "GET", "/api/v1/runtime/iris", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&router, "GET", &format!("/api/v1/runtime/by-id/{iris_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn service_registration_and_discovery() {
    let router = manager_router(manager_state());
    let entry = json!({
        "service_id": "manager-1",
        "service_type": "manager",
        "service_name": "control",
        "ip": "10.0.0.1",
        "sidecar_http_port": 8080,
        "sidecar_grpc_port": 8081,
        "service_http_port": 9090,
        "service_grpc_port": 9091,
        "uses_http": true,
        "uses_grpc": false,
    });
    let (status, body) = send(&router, "PUT", "/v1/registration", Some(entry)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["last_known_status"], "DOWN");

    let (_, doc) = send(&router, "GET", "/v1/registration/http-manager-control", None).await;
    assert!(doc["hosts"].as_array().unwrap().is_empty());

    // The manager itself is healthy without a probe.
    let (status, _) = send(&router, "GET", "/v1/health/manager-1", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, doc) = send(&router, "GET", "/v1/registration/http-manager-control", None).await;
    assert_eq!(doc["hosts"], json!([{"ip_address": "10.0.0.1", "port": 8080}]));

    // gRPC is not enabled for this service.
    let (_, doc) = send(&router, "GET", "/v1/registration/manager-control", None).await;
    assert!(doc["hosts"].as_array().unwrap().is_empty());

    let (status, _) = send(&router, "DELETE", "/v1/registration/manager-1", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, "GET", "/v1/health/manager-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Gateway ────────────────────────────────────────────────────────

/// Each stage appends its destination to `visited`.
struct AppendingHops;

#[async_trait]
impl HopClient for AppendingHops {
    async fn post(&self, stage: &Stage, body: Vec<u8>, _trace: &TraceHeaders) -> PipelineResult<HttpReply> {
        let mut value: Value = serde_json::from_slice(&body).unwrap();
        if stage.destination == "offline" {
            return Err(pipemesh_pipeline::PipelineError::Transport(
                "connection refused by 127.0.0.1:8080".to_string(),
            ));
        }
        if stage.destination == "broken" {
            return Ok(HttpReply {
                status: http::StatusCode::INTERNAL_SERVER_ERROR,
                body: bytes::Bytes::from_static(b"model crashed"),
            });
        }
        value["visited"]
            .as_array_mut()
            .unwrap()
            .push(json!(stage.destination));
        Ok(HttpReply {
            status: http::StatusCode::OK,
            body: bytes::Bytes::from(serde_json::to_vec(&value).unwrap()),
        })
    }
}

struct NoSender;

#[async_trait]
impl EnvelopeSender for NoSender {
    async fn send(&self, destination: &str, _envelope: Envelope, _trace: &TraceHeaders) -> PipelineResult<()> {
        Err(pipemesh_pipeline::PipelineError::Transport(format!(
            "{destination} unreachable"
        )))
    }
}

fn gateway() -> Router {
    let catalog = Arc::new(PipelineCatalog::new());
    catalog.replace(vec![
        PipelineDefinition {
            name: "score".to_string(),
            transport: TransportKind::Http,
            chain: vec!["iris".to_string(), "scorer".to_string()],
        },
        PipelineDefinition {
            name: "flaky".to_string(),
            transport: TransportKind::Http,
            chain: vec!["iris".to_string(), "broken".to_string(), "scorer".to_string()],
        },
        PipelineDefinition {
            name: "partitioned".to_string(),
            transport: TransportKind::Http,
            chain: vec!["iris".to_string(), "offline".to_string(), "scorer".to_string()],
        },
        PipelineDefinition {
            name: "async".to_string(),
            transport: TransportKind::Grpc,
            chain: vec!["iris".to_string()],
        },
    ]);
    let dispatcher = Dispatcher::new(
        DispatcherConfig {
            node_id: "gw-1".to_string(),
            request_timeout: Duration::from_secs(1),
        },
        catalog,
        Arc::new(AppendingHops),
        Arc::new(NoSender),
    );
    gateway_router(GatewayState {
        dispatcher: Arc::new(dispatcher),
    })
}

#[tokio::test]
async fn gateway_serves_http_chain() {
    let router = gateway();
    let (status, body) = send(&router, "POST", "/serve/score", Some(json!({"visited": []}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"visited": ["iris", "scorer"]}));
}

#[tokio::test]
async fn gateway_reports_failing_stage() {
    let router = gateway();
    let (status, body) = send(&router, "POST", "/serve/flaky", Some(json!({"visited": []}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("broken"));
}

#[tokio::test]
async fn gateway_unknown_endpoint_is_not_found() {
    let router = gateway();
    let (status, _) = send(&router, "POST", "/serve/nope", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gateway_unreachable_first_hop_is_bad_gateway() {
    let router = gateway();
    let (status, body) = send(&router, "POST", "/serve/async", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("iris"));
}

#[tokio::test]
async fn gateway_names_the_unreachable_http_stage() {
    let router = gateway();
    let (status, body) = send(&router, "POST", "/serve/partitioned", Some(json!({"visited": []}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().starts_with("stage offline failed"));
}
