//! Integration tests for the HTTP control surface

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{connect_ready, spawn_host, MockConnector, RunningHost};
use http_body_util::BodyExt; // for .collect().await
use marlin_host::file_manager::JsonUploadStore;
use marlin_host::web::{create_router, AppState};
use marlin_host::PrinterStatus;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

fn app(host: &RunningHost, dir: &TempDir) -> Router {
    let index = dir.path().join("uploads.json");
    std::fs::write(
        &index,
        json!([{ "_id": 7, "name": "cube", "filename": "cube.gcode", "size": 20 }]).to_string(),
    )
    .unwrap();
    std::fs::write(dir.path().join("cube.gcode"), "G28\nG1 X10\nM84\n").unwrap();
    create_router(AppState {
        printer: host.client.clone(),
        uploads: Arc::new(JsonUploadStore::new(index, dir.path())),
        events: host.subscriber.clone(),
    })
}

fn post(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn post_raw(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_status_reports_ready() {
    let (connector, mut devices) = MockConnector::new();
    let mut host = spawn_host(connector);
    let _device = connect_ready(&mut devices).await;
    common::wait_for_status(&mut host.events, PrinterStatus::Ready).await;
    let dir = tempfile::tempdir().unwrap();

    let response = app(&host, &dir).oneshot(get("/api/v1/printer/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ready" }));
}

#[tokio::test]
async fn test_print_requires_upload_id() {
    let (connector, _devices) = MockConnector::new();
    let host = spawn_host(connector);
    let dir = tempfile::tempdir().unwrap();

    let response = app(&host, &dir)
        .oneshot(post("/api/v1/printer/print", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "ER_MISSING_PARAMS");
}

#[tokio::test]
async fn test_empty_body_reports_missing_field() {
    let (connector, _devices) = MockConnector::new();
    let host = spawn_host(connector);
    let dir = tempfile::tempdir().unwrap();

    let response = app(&host, &dir)
        .oneshot(post_raw("/api/v1/printer/print", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "ER_MISSING_PARAMS");
    assert_eq!(json["error"]["message"], "Missing parameter: upload_id");
}

#[tokio::test]
async fn test_malformed_body_is_invalid_params() {
    let (connector, _devices) = MockConnector::new();
    let host = spawn_host(connector);
    let dir = tempfile::tempdir().unwrap();
    let app = app(&host, &dir);

    let response = app
        .clone()
        .oneshot(post("/api/v1/printer/print", json!({ "upload_id": "abc" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "ER_INVALID_PARAMS");

    let response = app
        .oneshot(post_raw("/api/v1/printer/jog", "{\"axis\": "))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "ER_INVALID_PARAMS");
}

#[tokio::test]
async fn test_print_unknown_upload() {
    let (connector, _devices) = MockConnector::new();
    let host = spawn_host(connector);
    let dir = tempfile::tempdir().unwrap();

    let response = app(&host, &dir)
        .oneshot(post("/api/v1/printer/print", json!({ "upload_id": 99 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "ER_UPLOAD_NOT_FOUND");
}

#[tokio::test]
async fn test_print_known_upload_streams_file() {
    let (connector, mut devices) = MockConnector::new();
    let mut host = spawn_host(connector);
    let mut device = connect_ready(&mut devices).await;
    common::wait_for_status(&mut host.events, PrinterStatus::Ready).await;
    let dir = tempfile::tempdir().unwrap();

    let response = app(&host, &dir)
        .oneshot(post("/api/v1/printer/print", json!({ "upload_id": 7 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "accepted": true }));

    assert_eq!(device.acknowledge(3).await, vec!["G28", "G1 X10", "M84"]);
    common::wait_for_status(&mut host.events, PrinterStatus::Completed).await;
}

#[tokio::test]
async fn test_print_while_not_ready_conflicts() {
    let (connector, _devices) = MockConnector::failing();
    let host = spawn_host(connector);
    let dir = tempfile::tempdir().unwrap();

    let response = app(&host, &dir)
        .oneshot(post("/api/v1/printer/print", json!({ "upload_id": 7 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"]["code"], "ER_NOT_READY");
}

#[tokio::test]
async fn test_fan_speed_validation() {
    let (connector, _devices) = MockConnector::new();
    let host = spawn_host(connector);
    let dir = tempfile::tempdir().unwrap();

    let response = app(&host, &dir)
        .oneshot(post("/api/v1/printer/fan", json!({ "speed": 300 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "ER_INVALID_PARAMS");
}

#[tokio::test]
async fn test_jog_and_temperature_reach_device() {
    let (connector, mut devices) = MockConnector::new();
    let mut host = spawn_host(connector);
    let mut device = connect_ready(&mut devices).await;
    common::wait_for_status(&mut host.events, PrinterStatus::Ready).await;
    let dir = tempfile::tempdir().unwrap();
    let app = app(&host, &dir);

    let response = app
        .clone()
        .oneshot(post("/api/v1/printer/jog", json!({ "axis": "z", "distance": 5 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(device.acknowledge(3).await, vec!["G91", "G1 Z5", "G90"]);

    let response = app
        .clone()
        .oneshot(post("/api/v1/printer/temperature", json!({ "heater": "hotend", "temperature": 200 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(device.acknowledge(1).await, vec!["M104 S200"]);

    let response = app.oneshot(get("/api/v1/printer/temperature")).await.unwrap();
    assert_eq!(body_json(response).await["hotend"]["set"], 200);
}

#[tokio::test]
async fn test_ports_listing() {
    let (connector, _devices) = MockConnector::new();
    let host = spawn_host(connector);
    let dir = tempfile::tempdir().unwrap();

    let response = app(&host, &dir).oneshot(get("/api/v1/ports")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "ports": ["/dev/ttyMOCK0"] }));
}

#[tokio::test]
async fn test_events_endpoint_is_an_event_stream() {
    let (connector, _devices) = MockConnector::new();
    let host = spawn_host(connector);
    let dir = tempfile::tempdir().unwrap();

    let response = app(&host, &dir).oneshot(get("/api/v1/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
}
