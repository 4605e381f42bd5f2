mod common;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, Method, Request, StatusCode},
    response::Response,
    routing::post,
    Json, Router,
};
use common::seeded_db;
use counsellor::constants::{
    COUNSELLOR_ROUTE, COUNSELLOR_ROUTE_SHORT, CREDITS_EXHAUSTED_MESSAGE, RATE_LIMITED_MESSAGE,
    UPSTREAM_UNAVAILABLE_MESSAGE,
};
use counsellor::db::DbPool;
use counsellor::gateway;
use counsellor::main_helper::GatewaySettings;
use counsellor::AppState;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;

const SSE_BODY: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";

#[derive(Clone)]
struct FakeUpstream {
    status: StatusCode,
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn upstream_handler(
    State(fake): State<FakeUpstream>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Ok(mut r) = fake.requests.lock() {
        r.push((auth, body));
    }
    let body = if fake.status.is_success() {
        SSE_BODY.to_string()
    } else {
        "{\"message\":\"upstream says no\"}".to_string()
    };
    match Response::builder()
        .status(fake.status)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from(body))
    {
        Ok(r) => r,
        Err(e) => panic!("Failed to build response: {}", e),
    }
}

async fn spawn_upstream(status: StatusCode) -> (String, FakeUpstream) {
    let fake = FakeUpstream {
        status,
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(upstream_handler))
        .with_state(fake.clone());
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(l) => l,
        Err(e) => panic!("Failed to bind: {}", e),
    };
    let addr = match listener.local_addr() {
        Ok(a) => a,
        Err(e) => panic!("No local addr: {}", e),
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}/v1/chat/completions", addr), fake)
}

fn app(db: DbPool, upstream_url: &str, key: Option<&str>) -> Router {
    let state = Arc::new(AppState {
        client: reqwest::Client::new(),
        settings: Arc::new(GatewaySettings {
            upstream_url: upstream_url.to_string(),
            upstream_key: key.map(str::to_string),
            model: "test/model".to_string(),
        }),
        db,
    });
    gateway::router(state, 1024 * 1024)
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    match Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
    {
        Ok(r) => r,
        Err(e) => panic!("Failed to build request: {}", e),
    }
}

fn get(uri: &str) -> Request<Body> {
    match Request::builder().uri(uri).body(Body::empty()) {
        Ok(r) => r,
        Err(e) => panic!("Failed to build request: {}", e),
    }
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = match app.oneshot(req).await {
        Ok(r) => r,
        Err(e) => panic!("Request failed: {:?}", e),
    };
    let status = response.status();
    let headers = response.headers().clone();
    let body = match to_bytes(response.into_body(), usize::MAX).await {
        Ok(b) => b.to_vec(),
        Err(e) => panic!("Failed to read body: {}", e),
    };
    (status, headers, body)
}

fn json_of(body: &[u8]) -> Value {
    match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => panic!("Body is not JSON ({}): {}", e, String::from_utf8_lossy(body)),
    }
}

const REQUEST: &str = r#"{"messages":[{"role":"user","content":"Which schools fit me?"}],"context":{"profile":{"full_name":"Ana Silva"},"shortlistedUniversities":[],"pendingTodos":[]},"userId":"user-1"}"#;

#[tokio::test]
async fn test_liveness_and_readiness() {
    let (_dir, pool) = seeded_db().await;

    let (status, _, body) = call(app(pool.clone(), "http://127.0.0.1:1/", None), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["status"], "ok");

    let (status, _, body) = call(app(pool.clone(), "http://127.0.0.1:1/", None), get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_of(&body)["upstream_key"], "missing");

    let (status, _, body) = call(app(pool, "http://127.0.0.1:1/", Some("k")), get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["status"], "ready");
}

#[tokio::test]
async fn test_missing_key_is_a_server_error() {
    let (_dir, pool) = seeded_db().await;
    let (url, fake) = spawn_upstream(StatusCode::OK).await;

    let (status, _, body) = call(app(pool, &url, None), post_json(COUNSELLOR_ROUTE, REQUEST)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let err = json_of(&body);
    assert!(err["error"].as_str().unwrap_or_default().contains("AI_GATEWAY_API_KEY"));
    assert_eq!(fake.requests.lock().map(|r| r.len()).unwrap_or(usize::MAX), 0);
}

#[tokio::test]
async fn test_invalid_body_is_rejected() {
    let (_dir, pool) = seeded_db().await;
    let (url, _fake) = spawn_upstream(StatusCode::OK).await;

    let (status, _, body) = call(app(pool, &url, Some("k")), post_json(COUNSELLOR_ROUTE, "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_of(&body)["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_upstream_failures_are_mapped() {
    let cases = [
        (StatusCode::TOO_MANY_REQUESTS, StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE),
        (StatusCode::PAYMENT_REQUIRED, StatusCode::PAYMENT_REQUIRED, CREDITS_EXHAUSTED_MESSAGE),
        (
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::INTERNAL_SERVER_ERROR,
            UPSTREAM_UNAVAILABLE_MESSAGE,
        ),
    ];
    for (upstream, expected, message) in cases {
        let (_dir, pool) = seeded_db().await;
        let (url, _fake) = spawn_upstream(upstream).await;
        let (status, _, body) = call(app(pool, &url, Some("k")), post_json(COUNSELLOR_ROUTE, REQUEST)).await;
        assert_eq!(status, expected, "upstream {}", upstream);
        assert_eq!(json_of(&body)["error"], message);
    }
}

#[tokio::test]
async fn test_success_relays_stream_unchanged() {
    let (_dir, pool) = seeded_db().await;
    let (url, fake) = spawn_upstream(StatusCode::OK).await;

    let (status, headers, body) =
        call(app(pool, &url, Some("secret-key")), post_json(COUNSELLOR_ROUTE_SHORT, REQUEST)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    assert_eq!(
        headers.get(header::CACHE_CONTROL).and_then(|v| v.to_str().ok()),
        Some("no-cache")
    );
    assert_eq!(body, SSE_BODY.as_bytes());

    let seen = match fake.requests.lock() {
        Ok(r) => r.clone(),
        Err(_) => panic!("poisoned"),
    };
    assert_eq!(seen.len(), 1);
    let (auth, upstream_body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer secret-key"));
    assert_eq!(upstream_body["model"], "test/model");
    assert_eq!(upstream_body["stream"], json!(true));

    let messages = match upstream_body["messages"].as_array() {
        Some(m) => m,
        None => panic!("messages missing: {}", upstream_body),
    };
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    let system = messages[0]["content"].as_str().unwrap_or_default();
    assert!(system.contains("\"full_name\": \"Ana Silva\""));
    assert_eq!(messages[1], json!({"role": "user", "content": "Which schools fit me?"}));
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin() {
    let (_dir, pool) = seeded_db().await;
    let req = match Request::builder()
        .method(Method::OPTIONS)
        .uri(COUNSELLOR_ROUTE)
        .header(header::ORIGIN, "https://app.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization, content-type, apikey")
        .body(Body::empty())
    {
        Ok(r) => r,
        Err(e) => panic!("Failed to build request: {}", e),
    };

    let (status, headers, _) = call(app(pool, "http://127.0.0.1:1/", Some("k")), req).await;
    assert!(status.is_success());
    assert_eq!(
        headers
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let (_dir, pool) = seeded_db().await;
    let (_, headers, _) = call(app(pool, "http://127.0.0.1:1/", None), get("/health")).await;
    assert!(headers.contains_key(counsellor::logging::REQUEST_ID_HEADER));
}
