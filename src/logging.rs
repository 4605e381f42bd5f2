use crate::redaction_layer::RedactingWriter;
use crate::sse::{DecoderStats, StreamPayload};
use crate::trace_layer::JsonTraceLayer;
use axum::{
    body::Body,
    http::{Request, Response},
    middleware::Next,
};
use std::panic;
use std::path::Path;
use tracing::{error, info};
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Keeps the non-blocking log writers flushing until dropped.
pub struct LogGuards {
    _file: tracing_appender::non_blocking::WorkerGuard,
    _trace: tracing_appender::non_blocking::WorkerGuard,
}

/// Installs the global subscriber: stderr, a daily text log and a redacted NDJSON trace, all under `log_dir`.
pub fn init_tracing(log_dir: &Path, quiet_stderr: bool) -> std::io::Result<LogGuards> {
    use tracing_subscriber::prelude::*;

    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => "counsellor=info,tower_http=info".into(),
    };

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "counsellor.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let trace_appender = tracing_appender::rolling::daily(log_dir, "trace.json");
    let (trace_writer, trace_guard) = tracing_appender::non_blocking(trace_appender);

    let stderr_layer = if quiet_stderr {
        None
    } else {
        Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .with(JsonTraceLayer::new(RedactingWriter::new(trace_writer)))
        .with(tracing_error::ErrorLayer::default())
        .init();

    setup_panic_hook();

    Ok(LogGuards {
        _file: file_guard,
        _trace: trace_guard,
    })
}

/// Sets up a global panic hook that logs panics using tracing.
pub fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            target: "panic",
            message = %message,
            location = %location,
            backtrace = %backtrace,
            "FATAL: Application panicked"
        );

        original_hook(panic_info);
    }));
}

/// Tags each gateway request with an id and runs it inside a `request` span.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response<Body> {
    let request_id = Uuid::new_v4().to_string();
    if let Ok(val) = request_id.parse() {
        req.headers_mut().insert(REQUEST_ID_HEADER, val);
    }

    let span = info_span!("request", request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;
    if let Ok(val) = request_id.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    response
}

#[derive(Debug, Default, Clone)]
pub struct StreamMetric {
    pub frames: usize,
    pub deltas: usize,
    pub actions: usize,
    pub text_chars: usize,
    pub action_types: Vec<String>,
}

impl StreamMetric {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_payload(&mut self, payload: &StreamPayload) {
        self.frames += 1;
        if let Some(text) = payload.delta_content() {
            self.deltas += 1;
            self.text_chars += text.chars().count();
        }
        if let Some(action) = &payload.action {
            self.actions += 1;
            let kind = action
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown");
            self.action_types.push(kind.to_string());
        }
    }

    pub fn log_summary(&self, decoder: &DecoderStats) {
        let actions_str = if self.action_types.is_empty() {
            format!("{}", self.actions)
        } else {
            format!("{} ({})", self.actions, self.action_types.join(", "))
        };

        info!(
            target: "flight_recorder",
            "[STREAM END] Frames: {} | Deltas: {} | Actions: {} | Text: {} chars | Skipped: {} | Malformed: {} | Recovered: {}",
            self.frames,
            self.deltas,
            actions_str,
            self.text_chars,
            decoder.skipped,
            decoder.malformed,
            decoder.recovered
        );
    }
}
