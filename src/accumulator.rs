use crate::sse::StreamPayload;

/// Folds streamed text fragments into the assistant's running message.
#[derive(Debug, Clone, Default)]
pub struct DeltaAccumulator {
    content: String,
    deltas: usize,
    finish_reason: Option<String>,
    provider_errors: Vec<serde_json::Value>,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one payload. Returns the full accumulated text when the payload carried a delta.
    pub fn push(&mut self, payload: &StreamPayload) -> Option<&str> {
        if let Some(reason) = payload.finish_reason() {
            self.finish_reason = Some(reason.to_string());
        }
        if let Some(err) = &payload.error {
            tracing::warn!("[🌐 -> ⚙️ ] Provider error in stream: {}", err);
            self.provider_errors.push(err.clone());
        }

        let delta = payload.delta_content()?;
        self.content.push_str(delta);
        self.deltas += 1;
        Some(&self.content)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn deltas(&self) -> usize {
        self.deltas
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    pub fn provider_errors(&self) -> &[serde_json::Value] {
        &self.provider_errors
    }

    pub fn into_content(self) -> String {
        self.content
    }
}
