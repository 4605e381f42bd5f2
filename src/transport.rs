use crate::context::CounsellorContext;
use crate::types::{CounsellorError, Result, WireMessage};
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    pub context: CounsellorContext,
    pub user_id: String,
}

/// Raw body chunks of a successful chat response.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

#[derive(Clone)]
pub struct ChatTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

/// Chat streams run as long as the assistant keeps talking; only connecting is bounded.
pub fn build_stream_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()?;
    Ok(client)
}

impl ChatTransport {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends the request and hands back the body stream. Non-2xx responses become `Upstream` errors.
    pub async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        tracing::info!(
            "[⚙️  -> 🌐] POST {} ({} messages)",
            self.endpoint,
            request.messages.len()
        );

        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(CounsellorError::Network)?;
        let status = response.status();
        tracing::info!("[🌐 -> ⚙️ ] Status: {}", status);

        if !status.is_success() {
            let body = match response.text().await {
                Ok(t) => t,
                Err(_) => String::new(),
            };
            let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            return Err(upstream_error(status, &body).into());
        }

        Ok(response
            .bytes_stream()
            .map(|r| r.map_err(std::io::Error::other))
            .boxed())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Maps a failed response to an error carrying the endpoint's own message when it sent one.
pub fn upstream_error(status: StatusCode, body: &str) -> CounsellorError {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(b) => b.error,
        Err(_) => match status {
            StatusCode::TOO_MANY_REQUESTS => crate::constants::RATE_LIMITED_MESSAGE.to_string(),
            StatusCode::PAYMENT_REQUIRED => crate::constants::CREDITS_EXHAUSTED_MESSAGE.to_string(),
            _ if body.trim().is_empty() => format!("request failed with status {}", status),
            _ => crate::str_utils::prefix_chars(body.trim(), 200).to_string(),
        },
    };
    CounsellorError::Upstream(status, message)
}
