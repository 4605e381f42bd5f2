//! The assistant endpoint: wraps the caller's context into a system prompt and
//! relays the upstream chat-completions event stream back unchanged.

use crate::constants::{
    CORS_ALLOWED_HEADERS, COUNSELLOR_ROUTE, COUNSELLOR_ROUTE_SHORT, CREDITS_EXHAUSTED_MESSAGE,
    RATE_LIMITED_MESSAGE, UPSTREAM_UNAVAILABLE_MESSAGE,
};
use crate::logging::request_id_middleware;
use crate::prompt::system_prompt;
use crate::str_utils::prefix_chars;
use crate::types::{CounsellorError, Result};
use crate::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderName, Method, StatusCode},
    middleware,
    response::Response,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounsellorRequest {
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    model: &'a str,
    messages: Vec<serde_json::Value>,
    stream: bool,
}

pub fn router(state: Arc<AppState>, max_body_size: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(
            CORS_ALLOWED_HEADERS
                .iter()
                .map(|h| HeaderName::from_static(*h))
                .collect::<Vec<_>>(),
        );

    Router::new()
        .route(COUNSELLOR_ROUTE, post(counsellor_handler))
        .route(COUNSELLOR_ROUTE_SHORT, post(counsellor_handler))
        .route("/health", get(crate::health::liveness))
        .route("/readyz", get(crate::health::readiness))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .with_state(state)
}

/// Status and body the endpoint returns when the upstream call fails.
pub fn map_upstream_failure(status: reqwest::StatusCode) -> CounsellorError {
    match status.as_u16() {
        429 => CounsellorError::Upstream(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE.into()),
        402 => CounsellorError::Upstream(StatusCode::PAYMENT_REQUIRED, CREDITS_EXHAUSTED_MESSAGE.into()),
        _ => CounsellorError::Upstream(
            StatusCode::INTERNAL_SERVER_ERROR,
            UPSTREAM_UNAVAILABLE_MESSAGE.into(),
        ),
    }
}

pub async fn counsellor_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response> {
    let request: CounsellorRequest = serde_json::from_slice(&body)
        .map_err(|e| CounsellorError::Validation(format!("invalid request body: {}", e)))?;

    let key = match state.settings.upstream_key.as_deref() {
        Some(k) => k,
        None => return Err(CounsellorError::internal("AI_GATEWAY_API_KEY is not configured").into()),
    };

    tracing::info!(
        "[🖥️  -> ⚙️ ] Counsellor request: {} messages, user {}",
        request.messages.len(),
        request.user_id.as_deref().unwrap_or("anonymous")
    );

    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(serde_json::json!({
        "role": "system",
        "content": system_prompt(&request.context)?,
    }));
    messages.extend(request.messages);

    let upstream = UpstreamRequest {
        model: &state.settings.model,
        messages,
        stream: true,
    };

    let response = state
        .client
        .post(&state.settings.upstream_url)
        .header("Authorization", format!("Bearer {}", key))
        .json(&upstream)
        .send()
        .await
        .map_err(CounsellorError::Network)?;

    let status = response.status();
    tracing::info!("[☁️  -> ⚙️ ] Upstream status: {}", status);

    if !status.is_success() {
        let error_body = match response.text().await {
            Ok(t) => t,
            Err(_) => "Unknown error (failed to read response text)".to_string(),
        };
        tracing::error!(
            "[☁️  -> ⚙️ ] AI gateway error {}: {}",
            status,
            prefix_chars(&error_body, 500)
        );
        return Err(map_upstream_failure(status).into());
    }

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(response.bytes_stream()))
        .map_err(|e| CounsellorError::internal(format!("failed to build response: {}", e)))?;
    Ok(response)
}
