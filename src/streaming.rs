use crate::accumulator::DeltaAccumulator;
use crate::actions::ActionDispatcher;
use crate::constants::MAX_STREAM_LINES;
use crate::logging::StreamMetric;
use crate::sse::{DecoderStats, FrameStream, SseFrame};
use crate::types::{CounsellorError, Result};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// `[DONE]` was received.
    Done,
    /// The body ended without an end marker.
    Eof,
}

#[derive(Debug)]
pub struct StreamOutcome {
    pub content: String,
    pub end: StreamEnd,
    pub metric: StreamMetric,
    pub decoder: DecoderStats,
}

pub struct StreamHandler;

impl StreamHandler {
    /// Reads frames until `[DONE]` or end of body. Text deltas are folded and reported through
    /// `on_text` with the full message so far; actions go to the dispatcher in arrival order.
    pub async fn handle_stream<S, F>(
        mut frames: FrameStream<S>,
        dispatcher: Option<&ActionDispatcher>,
        mut on_text: F,
    ) -> Result<StreamOutcome>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Unpin,
        F: FnMut(&str),
    {
        let mut accumulator = DeltaAccumulator::new();
        let mut metric = StreamMetric::new();
        let mut frame_count = 0;
        let mut end = StreamEnd::Eof;

        while let Some(frame) = frames.next().await {
            frame_count += 1;
            if frame_count > MAX_STREAM_LINES {
                tracing::error!(
                    "[🌐 -> ⚙️ ] Stream exceeded max frame limit ({})",
                    MAX_STREAM_LINES
                );
                return Err(CounsellorError::internal("Stream exceeded max frame limit").into());
            }

            let payload = match frame? {
                SseFrame::Done => {
                    end = StreamEnd::Done;
                    break;
                }
                SseFrame::Payload(p) => p,
            };

            metric.record_payload(&payload);
            if let Some(full) = accumulator.push(&payload) {
                on_text(full);
            }

            if let Some(action) = &payload.action {
                match dispatcher {
                    Some(d) => {
                        d.dispatch(action).await;
                    }
                    None => tracing::debug!("[🌐 -> ⚙️ ] No dispatcher, ignoring action"),
                }
            }
        }

        if end == StreamEnd::Eof {
            tracing::warn!("[🌐 -> ⚙️ ] Stream ended without [DONE]");
        }

        let decoder = frames.decoder().stats();
        metric.log_summary(&decoder);
        if let Some(reason) = accumulator.finish_reason() {
            tracing::debug!("[🌐 -> ⚙️ ] Finish reason: {}", reason);
        }

        Ok(StreamOutcome {
            content: accumulator.into_content(),
            end,
            metric,
            decoder,
        })
    }
}
