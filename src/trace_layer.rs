use serde_json::{json, Value};
use std::io::Write;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Writes one JSON object per event (NDJSON) to the wrapped writer.
pub struct JsonTraceLayer<W: Write + Send + Sync + 'static> {
    writer: std::sync::Mutex<W>,
}

impl<W: Write + Send + Sync + 'static> JsonTraceLayer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: std::sync::Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonTraceLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = json!({});
        let mut visitor = JsonVisitor(&mut fields);
        event.record(&mut visitor);

        let spans: Vec<Value> = match ctx.event_scope(event) {
            Some(scope) => scope
                .from_root()
                .map(|span| json!({ "name": span.name(), "id": span.id().into_u64() }))
                .collect(),
            None => Vec::new(),
        };

        let output = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": event.metadata().level().to_string(),
            "target": event.metadata().target(),
            "spans": spans,
            "fields": fields,
        });

        if let Ok(mut w) = self.writer.lock() {
            let _ = writeln!(w, "{}", output);
        }
    }
}

struct JsonVisitor<'a>(&'a mut Value);

impl<'a> tracing::field::Visit for JsonVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0[field.name()] = json!(format!("{:?}", value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0[field.name()] = json!(value);
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0[field.name()] = json!(value);
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0[field.name()] = json!(value);
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0[field.name()] = json!(value);
    }
}
