
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use compute_worker::source::{router, ServerState};
use compute_worker::worker::Pipeline;
use test_harness::{happy_runner, pipeline, sandbox_config, submit_reply, FakeRunner, Reply, TX_HASH};

fn app(pipeline: Arc<Pipeline>) -> axum::Router {
    router(ServerState { pipeline })
}

fn post_task(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/process_task")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_process_task_success() {
    let runner = happy_runner(r#"{"c": [4, 10, 18]}"#);
    let app = app(pipeline(sandbox_config(), runner.clone(), runner.clone()));

    let (status, body) = send(
        app,
        post_task(r#"{"taskId": 0, "image": "worker/multiply:1", "inputData": "{}"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success", "txHash": TX_HASH}));
    assert_eq!(runner.count("mxpy", "call"), 1);
}

#[tokio::test]
async fn test_malformed_body_is_rejected_without_side_effects() {
    let runner = happy_runner("out");
    let app = app(pipeline(sandbox_config(), runner.clone(), runner.clone()));

    let (status, body) = send(app.clone(), post_task(r#"{"image": "img"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, _) = send(app.clone(), post_task("not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app, post_task(r#"{"taskId": 1, "image": ""}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_missing_image_is_server_error_and_evicted_once() {
    let runner = FakeRunner::new(|program, args| match (program, args[0].as_str()) {
        ("docker", "pull") => Reply::fail("repository does not exist"),
        ("docker", "run") => Reply::fail("Unable to find image 'nonexistent:latest' locally"),
        ("docker", "rmi") => Reply::fail("No such image"),
        _ => submit_reply(),
    });
    let app = app(pipeline(sandbox_config(), runner.clone(), runner.clone()));

    let (status, body) = send(
        app,
        post_task(r#"{"taskId": 5, "image": "nonexistent:latest"}"#),
    )
    .await;

    assert!(status.is_server_error());
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().contains("nonexistent:latest"));
    assert!(body.get("txHash").is_none());
    assert_eq!(runner.count("docker", "rmi"), 1);
    assert_eq!(runner.count("mxpy", "call"), 0);
}

#[tokio::test]
async fn test_missing_runtime_is_service_unavailable() {
    let runner = FakeRunner::new(|program, _| match program {
        "docker" => Reply::NotFound,
        _ => submit_reply(),
    });
    let app = app(pipeline(sandbox_config(), runner.clone(), runner.clone()));

    let (status, body) = send(app, post_task(r#"{"taskId": 2, "image": "img"}"#)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_duplicate_submission_is_conflict() {
    let runner = happy_runner("out");
    let app = app(pipeline(sandbox_config(), runner.clone(), runner.clone()));
    let request = r#"{"taskId": 9, "image": "img", "inputData": "x"}"#;

    let (first, _) = send(app.clone(), post_task(request)).await;
    let (second, body) = send(app, post_task(request)).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["txHash"], TX_HASH);
    assert_eq!(runner.count("docker", "run"), 1);
}

#[tokio::test]
async fn test_concurrent_requests_for_different_tasks_run_in_parallel() {
    let runner = FakeRunner::new(|program, args| match (program, args[0].as_str()) {
        ("docker", "run") => Reply::after(Duration::from_millis(200), Reply::stdout("out")),
        ("docker", _) => Reply::stdout(""),
        _ => submit_reply(),
    });
    let app = app(pipeline(sandbox_config(), runner.clone(), runner.clone()));

    let (a, b) = tokio::join!(
        send(app.clone(), post_task(r#"{"taskId": 1, "image": "img"}"#)),
        send(app.clone(), post_task(r#"{"taskId": 2, "image": "img"}"#)),
    );

    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);
    assert!(runner.peak_concurrency() >= 2);
}

#[tokio::test]
async fn test_cors_preflight() {
    let runner = happy_runner("out");
    let app = app(pipeline(sandbox_config(), runner.clone(), runner.clone()));

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/process_task")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
    assert!(methods.contains("POST"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_submissions_and_health() {
    let runner = happy_runner("out");
    let app = app(pipeline(sandbox_config(), runner.clone(), runner.clone()));

    send(app.clone(), post_task(r#"{"taskId": 4, "image": "img"}"#)).await;

    let (status, body) = send(
        app.clone(),
        Request::get("/api/submissions").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["taskId"], 4);
    assert_eq!(records[0]["txHash"], TX_HASH);

    let (status, body) = send(app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}
