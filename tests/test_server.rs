//! HTTP surface tests: the router is driven in-process with `oneshot`.

extern crate cseval;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use cseval::guard::{GuardState, Terminate};
use cseval::server::{Environment, EvalServer, ServerConfig};
use tower::ServiceExt;

#[derive(Default)]
struct CountingTerminator(AtomicUsize);

impl Terminate for CountingTerminator {
    fn terminate(&self, _reason: &str) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn server(environment: Environment) -> (EvalServer, Arc<CountingTerminator>) {
    let terminator = Arc::new(CountingTerminator::default());
    let config = ServerConfig::new()
        .with_environment(environment)
        .with_logging(false)
        .with_request_timeout(Duration::from_secs(30))
        .with_drain_grace(Duration::from_secs(5));
    (EvalServer::with_config(config).with_terminator(terminator.clone()), terminator)
}

#[tokio::test]
async fn test_health() {
    let (server, _) = server(Environment::Development);
    let response = server
        .build_router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_eval_endpoint() {
    let (server, _) = server(Environment::Development);
    let response = server
        .build_router()
        .oneshot(post("/eval", "Console.WriteLine(\"hi\"); 5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["consoleOut"], "hi\n");
    assert_eq!(body["returnValue"], 5);
    assert_eq!(body["returnTypeName"], "int");
}

#[tokio::test]
async fn test_eval_compile_error_is_still_ok() {
    let (server, _) = server(Environment::Development);
    let response = server.build_router().oneshot(post("/eval", "1+")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(!body["diagnostics"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_utf8_body_is_evaluated() {
    let (server, _) = server(Environment::Development);
    let request = Request::builder()
        .method("POST")
        .uri("/eval")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(vec![b'"', 0xff, 0xfe, b'"']))
        .unwrap();
    let response = server.build_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["returnValue"], "\u{fffd}\u{fffd}");
    assert_eq!(body["returnTypeName"], "string");
}

#[tokio::test]
async fn test_il_endpoint() {
    let (server, _) = server(Environment::Development);
    let response = server.build_router().oneshot(post("/il", "return 1;")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains(".method public hidebysig instance object Main()"));
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let terminator = Arc::new(CountingTerminator::default());
    let config = ServerConfig::new().with_logging(false).with_max_body_size(16);
    let server = EvalServer::with_config(config).with_terminator(terminator);
    let response = server
        .build_router()
        .oneshot(post("/eval", "Console.WriteLine(\"far too long\");"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_development_never_arms() {
    let (server, _) = server(Environment::Development);
    let (router, guard) = server.build();
    let response = router.oneshot(post("/eval", "1")).await.unwrap();
    let _ = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    assert_eq!(guard.state(), GuardState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_production_eval_drains_after_response() {
    let (server, terminator) = server(Environment::Production);
    let (router, guard) = server.build();
    let response = router.oneshot(post("/EVAL", "1")).await.unwrap();
    assert_eq!(guard.state(), GuardState::Armed);
    let _ = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    assert_eq!(guard.state(), GuardState::Draining);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(terminator.0.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_response_counts_as_completed() {
    let (server, _) = server(Environment::Production);
    let (router, guard) = server.build();
    let response = router.oneshot(post("/eval", "1")).await.unwrap();
    drop(response);
    assert_eq!(guard.state(), GuardState::Draining);
}

#[tokio::test(start_paused = true)]
async fn test_production_il_is_not_guarded() {
    let (server, _) = server(Environment::Production);
    let (router, guard) = server.build();
    let response = router.oneshot(post("/il", "return 1;")).await.unwrap();
    let _ = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    assert_eq!(guard.state(), GuardState::Idle);
}
