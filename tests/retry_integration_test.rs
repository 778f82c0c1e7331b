//! Integration tests for buffered requests against a mock Responses endpoint
//!
//! Covers retry behaviour, failure classification and the headers every
//! attempt carries.

use open_responder::{
    ErrorKind, Hooks, Request, RequestContext, Responder, ResponderOptions, RetryPolicy,
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Returns the queued templates in order, then 500s.
struct SequenceResponder {
    responses: Mutex<VecDeque<ResponseTemplate>>,
}

impl SequenceResponder {
    fn new(responses: Vec<ResponseTemplate>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ResponseTemplate::new(500))
    }
}

fn completed_body(text: &str) -> Value {
    json!({
        "id": "resp_123",
        "object": "response",
        "status": "completed",
        "model": "test-model",
        "output": [{
            "type": "message",
            "id": "msg_1",
            "role": "assistant",
            "status": "completed",
            "content": [{"type": "output_text", "text": text, "annotations": []}]
        }],
        "usage": {"input_tokens": 5, "output_tokens": 2, "total_tokens": 7}
    })
}

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(200))
        .jitter_factor(0.0)
        .build()
        .unwrap()
}

fn responder_for(server: &MockServer, policy: RetryPolicy) -> Responder {
    Responder::new(
        ResponderOptions::builder()
            .base_url(server.uri())
            .api_key("test-key")
            .retry_policy(policy)
            .build()
            .unwrap(),
    )
    .unwrap()
}

fn request() -> Request {
    Request::builder()
        .model("test-model")
        .user("Say hi")
        .build()
        .unwrap()
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

#[tokio::test]
async fn test_buffered_success() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completed_body("Hi!")))
        .expect(1)
        .mount(&server)
        .await;

    let response = responder_for(&server, fast_policy(3))
        .respond(&request())
        .await
        .unwrap();

    assert_eq!(response.id, "resp_123");
    assert_eq!(response.output_text(), "Hi!");
    assert_eq!(response.usage.map(|u| u.total_tokens), Some(7));
}

#[tokio::test]
async fn test_request_body_is_not_streaming() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completed_body("ok")))
        .mount(&server)
        .await;

    let request = Request::builder()
        .model("test-model")
        .instructions("Be brief.")
        .user("Say hi")
        .stream(true)
        .build()
        .unwrap();
    responder_for(&server, fast_policy(0))
        .respond(&request)
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["instructions"], "Be brief.");
    assert_eq!(body["stream"], false);
}

#[tokio::test]
async fn test_rate_limit_then_success_retries_once() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(SequenceResponder::new(vec![
            ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "slow down"}})),
            ResponseTemplate::new(200).set_body_json(completed_body("after retry")),
        ]))
        .mount(&server)
        .await;

    let response = responder_for(&server, fast_policy(3))
        .respond(&request())
        .await
        .unwrap();

    assert_eq!(response.output_text(), "after retry");
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"error": {"message": "internal"}})),
        )
        .mount(&server)
        .await;

    let err = responder_for(&server, fast_policy(3))
        .respond(&request())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ServerError);
    assert_eq!(err.status(), Some(500));
    assert!(err.message().contains("internal"));
    assert_eq!(request_count(&server).await, 4);
}

#[tokio::test]
async fn test_permanent_failures_are_not_retried() {
    init_logging();
    let cases = [
        (400, ErrorKind::InvalidRequest),
        (401, ErrorKind::AuthenticationFailed),
        (403, ErrorKind::AuthorizationFailed),
        (404, ErrorKind::InvalidRequest),
        (422, ErrorKind::InvalidRequest),
    ];

    for (status, kind) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(
                ResponseTemplate::new(status)
                    .insert_header("x-request-id", "req_abc")
                    .set_body_json(json!({"error": {"message": "nope"}})),
            )
            .mount(&server)
            .await;

        let err = responder_for(&server, fast_policy(3))
            .respond(&request())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), kind, "status {}", status);
        assert!(!err.is_retryable());
        assert_eq!(err.request_id(), Some("req_abc"));
        assert!(err.response_body().unwrap().contains("nope"));
        assert!(err.suggestion().is_some());
        assert_eq!(request_count(&server).await, 1, "status {}", status);
    }
}

#[tokio::test]
async fn test_retry_after_is_honoured_and_capped() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(SequenceResponder::new(vec![
            ResponseTemplate::new(429).insert_header("retry-after", "30"),
            ResponseTemplate::new(200).set_body_json(completed_body("ok")),
        ]))
        .mount(&server)
        .await;

    let started = Instant::now();
    responder_for(&server, fast_policy(1))
        .respond(&request())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // 30s hint, capped at the 200ms max delay
    assert!(elapsed >= Duration::from_millis(150), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "{:?}", elapsed);
}

#[tokio::test]
async fn test_final_rate_limit_error_carries_retry_after() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = responder_for(&server, RetryPolicy::disabled())
        .respond(&request())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    assert!(err.suggestion().unwrap().contains("7 seconds"));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_custom_retryable_statuses() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(SequenceResponder::new(vec![
            ResponseTemplate::new(409),
            ResponseTemplate::new(200).set_body_json(completed_body("ok")),
        ]))
        .mount(&server)
        .await;

    let policy = RetryPolicy::builder()
        .max_retries(2)
        .initial_delay(Duration::from_millis(5))
        .retryable_status_codes([409])
        .build()
        .unwrap();

    let response = responder_for(&server, policy)
        .respond(&request())
        .await
        .unwrap();
    assert_eq!(response.output_text(), "ok");
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_undecodable_body_is_parsing_error() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = responder_for(&server, fast_policy(2))
        .respond(&request())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Parsing);
    assert_eq!(err.response_body(), Some("<html>gateway</html>"));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_connection_failure_is_transport_error() {
    init_logging();
    let attempts = Arc::new(Mutex::new(None));
    let seen = attempts.clone();
    // Nothing listens on port 1
    let responder = Responder::new(
        ResponderOptions::builder()
            .base_url("http://127.0.0.1:1")
            .retry_policy(fast_policy(1))
            .hooks(Hooks::new().on_response_failed(move |event| {
                let seen = seen.clone();
                async move {
                    *seen.lock().unwrap() = Some(event.attempts);
                }
            }))
            .build()
            .unwrap(),
    )
    .unwrap();

    let err = responder.respond(&request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(err.is_retryable());
    assert_eq!(*attempts.lock().unwrap(), Some(2));
}

#[tokio::test]
async fn test_context_headers_sent_on_every_attempt() {
    init_logging();
    let server = MockServer::start().await;
    let context = RequestContext::new()
        .with_trace_id("0af7651916cd43dd8448eb211c80319c")
        .with_session_id("session-1");

    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(header("x-trace-id", "0af7651916cd43dd8448eb211c80319c"))
        .and(header("x-session-id", "session-1"))
        .and(header("x-parent-span-id", context.span_id()))
        .respond_with(SequenceResponder::new(vec![
            ResponseTemplate::new(503),
            ResponseTemplate::new(200).set_body_json(completed_body("traced")),
        ]))
        .expect(2)
        .mount(&server)
        .await;

    let response = responder_for(&server, fast_policy(2))
        .respond_with_context(&request(), &context)
        .await
        .unwrap();
    assert_eq!(response.output_text(), "traced");
}

#[tokio::test]
async fn test_default_headers_are_sent() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(header("x-org", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completed_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let responder = Responder::new(
        ResponderOptions::builder()
            .base_url(format!("{}/", server.uri()))
            .default_header("x-org", "acme")
            .build()
            .unwrap(),
    )
    .unwrap();

    assert_eq!(responder.respond_text("test-model", "hi").await.unwrap(), "ok");
}
