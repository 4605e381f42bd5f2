//! Incremental decoder for the assistant's `text/event-stream` body.
//!
//! Bytes are buffered until a full line is available, so chunk boundaries
//! (including ones that split a multi-byte character) never reach the JSON
//! layer. A payload line that is itself cut short is held as a carry-over and
//! joined with the lines that follow, up to [`MAX_PENDING_LINES`].

use crate::constants::{MAX_PAYLOAD_BYTES, MAX_PENDING_LINES, SSE_DATA_PREFIX, SSE_DONE_MARKER};
use crate::json_shape::{self, PayloadShape};
use crate::str_utils::prefix_chars;
use crate::types::CounsellorError;
use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use serde_json::Value;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::io::StreamReader;

/// --- WIRE TYPES ---

/// One decoded `data:` object. Fields of an unexpected JSON type read as absent,
/// so a frame never loses its `action` because `choices` looked odd.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamPayload {
    pub choices: Vec<PayloadChoice>,
    /// Out-of-band directive, validated later by the dispatcher.
    pub action: Option<Value>,
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadChoice {
    pub delta: Option<PayloadDelta>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadDelta {
    pub content: Option<String>,
}

fn take_present(value: &mut Value, key: &str) -> Option<Value> {
    value.get_mut(key).map(Value::take).filter(|v| !v.is_null())
}

fn string_at(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

impl PayloadChoice {
    fn from_value(choice: &Value) -> Self {
        Self {
            delta: choice.get("delta").filter(|d| d.is_object()).map(|d| PayloadDelta {
                content: string_at(d, "content"),
            }),
            finish_reason: string_at(choice, "finish_reason"),
        }
    }
}

impl StreamPayload {
    pub fn from_value(mut value: Value) -> Self {
        let choices = match value.get("choices") {
            Some(Value::Array(items)) => items.iter().map(PayloadChoice::from_value).collect(),
            _ => Vec::new(),
        };
        Self {
            choices,
            action: take_present(&mut value, "action"),
            error: take_present(&mut value, "error"),
        }
    }

    /// `choices[0].delta.content`, when non-empty.
    pub fn delta_content(&self) -> Option<&str> {
        let content = self.choices.first()?.delta.as_ref()?.content.as_deref()?;
        if content.is_empty() {
            None
        } else {
            Some(content)
        }
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first()?.finish_reason.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Payload(StreamPayload),
    Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub lines: usize,
    pub payloads: usize,
    pub skipped: usize,
    pub malformed: usize,
    pub recovered: usize,
    pub dropped_carry_overs: usize,
}

struct CarryOver {
    text: String,
    continuations: usize,
}

#[derive(Default)]
pub struct SseFrameCodec {
    /// Bytes of the buffer already scanned for a newline.
    next_index: usize,
    carry_over: Option<CarryOver>,
    finished: bool,
    stats: DecoderStats,
}

impl SseFrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn handle_line(&mut self, raw: &[u8]) -> Option<SseFrame> {
        self.stats.lines += 1;

        let text = match std::str::from_utf8(raw) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("[🌐 -> ⚙️ ] Skipping non UTF-8 line: {}", e);
                self.stats.skipped += 1;
                return None;
            }
        };
        let line = text.strip_suffix('\r').unwrap_or(text);

        if let Some(carry) = self.carry_over.take() {
            return self.continue_carry_over(carry, line);
        }

        if line.starts_with(':') || line.trim().is_empty() {
            return None;
        }

        let data = match line.strip_prefix(SSE_DATA_PREFIX) {
            Some(d) => d.trim(),
            None => {
                tracing::debug!("[🌐 -> ⚙️ ] Skipping non-data line: {}", prefix_chars(line, 80));
                self.stats.skipped += 1;
                return None;
            }
        };

        if data == SSE_DONE_MARKER {
            return Some(self.finish());
        }

        self.parse_payload(data.to_string(), 0)
    }

    fn finish(&mut self) -> SseFrame {
        tracing::debug!("[🌐 -> ⚙️ ] Stream end marker [DONE] received");
        self.finished = true;
        SseFrame::Done
    }

    fn continue_carry_over(&mut self, carry: CarryOver, line: &str) -> Option<SseFrame> {
        // Comments and blank lines never split a payload; keep waiting.
        if line.starts_with(':') || line.trim().is_empty() {
            self.carry_over = Some(carry);
            return None;
        }

        let (fragment, is_data_line) = match line.strip_prefix(SSE_DATA_PREFIX) {
            Some(d) => (d, true),
            None => (line, false),
        };

        if fragment.trim() == SSE_DONE_MARKER {
            self.drop_carry_over(&carry, "stream ended");
            return Some(self.finish());
        }

        // A fresh, self-contained frame means the carry-over was never going to complete.
        if is_data_line {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(fragment.trim()) {
                self.drop_carry_over(&carry, "superseded by a complete frame");
                self.stats.payloads += 1;
                return Some(SseFrame::Payload(StreamPayload::from_value(value)));
            }
        }

        let mut joined = carry.text;
        joined.push('\n');
        joined.push_str(fragment);
        self.parse_payload(joined, carry.continuations + 1)
    }

    fn parse_payload(&mut self, text: String, continuations: usize) -> Option<SseFrame> {
        if text.len() > MAX_PAYLOAD_BYTES {
            self.stats.dropped_carry_overs += 1;
            tracing::warn!(
                "[🌐 -> ⚙️ ] Dropping oversized payload ({} bytes)",
                text.len()
            );
            return None;
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(value @ Value::Object(_)) => {
                if continuations > 0 {
                    self.stats.recovered += 1;
                    tracing::debug!(
                        "[🌐 -> ⚙️ ] Recovered payload split over {} lines",
                        continuations + 1
                    );
                }
                self.stats.payloads += 1;
                Some(SseFrame::Payload(StreamPayload::from_value(value)))
            }
            Ok(other) => {
                self.stats.malformed += 1;
                tracing::warn!(
                    "[🌐 -> ⚙️ ] Skipping non-object payload: {}",
                    prefix_chars(&other.to_string(), 120)
                );
                None
            }
            Err(e) => match json_shape::classify(&text) {
                PayloadShape::Truncated if continuations < MAX_PENDING_LINES => {
                    tracing::trace!("[🌐 -> ⚙️ ] Payload incomplete, waiting for more: {}", e);
                    self.carry_over = Some(CarryOver {
                        text,
                        continuations,
                    });
                    None
                }
                PayloadShape::Truncated => {
                    self.drop_carry_over(
                        &CarryOver {
                            text,
                            continuations,
                        },
                        "too many continuation lines",
                    );
                    None
                }
                PayloadShape::Balanced | PayloadShape::Malformed => {
                    self.stats.malformed += 1;
                    tracing::warn!(
                        "[🌐 -> ⚙️ ] Skipping malformed payload ({}): {}",
                        e,
                        prefix_chars(&text, 120)
                    );
                    None
                }
            },
        }
    }

    fn drop_carry_over(&mut self, carry: &CarryOver, reason: &str) {
        self.stats.dropped_carry_overs += 1;
        tracing::warn!(
            "[🌐 -> ⚙️ ] Dropping incomplete payload after {} continuation lines ({}): {}",
            carry.continuations,
            reason,
            prefix_chars(&carry.text, 120)
        );
    }
}

impl Decoder for SseFrameCodec {
    type Item = SseFrame;
    type Error = CounsellorError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<SseFrame>, CounsellorError> {
        if self.finished {
            src.clear();
            return Ok(None);
        }

        loop {
            let newline = src[self.next_index..].iter().position(|b| *b == b'\n');
            let idx = match newline {
                Some(offset) => self.next_index + offset,
                None => {
                    self.next_index = src.len();
                    if src.len() > MAX_PAYLOAD_BYTES {
                        return Err(CounsellorError::Protocol(format!(
                            "SSE line exceeds {} bytes",
                            MAX_PAYLOAD_BYTES
                        )));
                    }
                    return Ok(None);
                }
            };

            let line = src.split_to(idx + 1);
            self.next_index = 0;
            if let Some(frame) = self.handle_line(&line[..idx]) {
                return Ok(Some(frame));
            }
            if self.finished {
                src.clear();
                return Ok(None);
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<SseFrame>, CounsellorError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if self.finished {
            src.clear();
            return Ok(None);
        }

        // An unterminated last line is still a line.
        if !src.is_empty() {
            let line = src.split();
            self.next_index = 0;
            if let Some(frame) = self.handle_line(&line) {
                return Ok(Some(frame));
            }
        }

        if let Some(carry) = self.carry_over.take() {
            self.drop_carry_over(&carry, "end of stream");
        }
        Ok(None)
    }
}

pub type FrameStream<S> = FramedRead<StreamReader<S, Bytes>, SseFrameCodec>;

/// Wraps a byte-chunk stream (e.g. `reqwest::Response::bytes_stream`) in the frame decoder.
pub fn frame_stream<S>(chunks: S) -> FrameStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    FramedRead::new(StreamReader::new(chunks), SseFrameCodec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<SseFrame> {
        let mut codec = SseFrameCodec::new();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        loop {
            match codec.decode_eof(&mut buf) {
                Ok(Some(f)) => out.push(f),
                Ok(None) => break,
                Err(e) => panic!("decode failed: {:?}", e),
            }
        }
        out
    }

    fn texts(frames: &[SseFrame]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|f| match f {
                SseFrame::Payload(p) => p.delta_content().map(str::to_string),
                SseFrame::Done => None,
            })
            .collect()
    }

    #[test]
    fn test_comments_blank_and_foreign_lines_are_skipped() {
        let input = b": keepalive\n\nevent: ping\ndata: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\r\n\r\n";
        let frames = decode_all(input);
        assert_eq!(texts(&frames), vec!["hi"]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_done_stops_decoding() {
        let input = b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n";
        let frames = decode_all(input);
        assert_eq!(texts(&frames), vec!["a"]);
        assert_eq!(frames.last(), Some(&SseFrame::Done));
    }

    #[test]
    fn test_partial_line_waits_for_more_bytes() {
        let mut codec = SseFrameCodec::new();
        let mut buf = BytesMut::from(&b"data: {\"choices\":[{\"delta\":{\"con"[..]);
        assert!(matches!(codec.decode(&mut buf), Ok(None)));
        buf.extend_from_slice(b"tent\":\"Hel\"}}]}\n");
        match codec.decode(&mut buf) {
            Ok(Some(SseFrame::Payload(p))) => assert_eq!(p.delta_content(), Some("Hel")),
            other => panic!("Expected payload, got {:?}", other),
        }
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café 🎓\"}}]}\n".as_bytes();
        let split = line.len() - 8; // inside the emoji
        let mut codec = SseFrameCodec::new();
        let mut buf = BytesMut::from(&line[..split]);
        assert!(matches!(codec.decode(&mut buf), Ok(None)));
        buf.extend_from_slice(&line[split..]);
        match codec.decode(&mut buf) {
            Ok(Some(SseFrame::Payload(p))) => assert_eq!(p.delta_content(), Some("café 🎓")),
            other => panic!("Expected payload, got {:?}", other),
        }
    }

    #[test]
    fn test_payload_split_over_two_lines_is_recovered() {
        let input = b"data: {\"choices\":[{\"delta\":\ndata: {\"content\":\"joined\"}}]}\n";
        let mut codec = SseFrameCodec::new();
        let mut buf = BytesMut::from(&input[..]);
        let mut frames = Vec::new();
        while let Ok(Some(f)) = codec.decode(&mut buf) {
            frames.push(f);
        }
        assert_eq!(texts(&frames), vec!["joined"]);
        assert_eq!(codec.stats().recovered, 1);
    }

    #[test]
    fn test_malformed_line_does_not_block_later_frames() {
        let input = b"data: {\"choices\": oops}\ndata: not json\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n";
        let mut codec = SseFrameCodec::new();
        let mut buf = BytesMut::from(&input[..]);
        let mut frames = Vec::new();
        while let Ok(Some(f)) = codec.decode(&mut buf) {
            frames.push(f);
        }
        assert_eq!(texts(&frames), vec!["ok"]);
        assert_eq!(codec.stats().malformed, 2);
    }

    #[test]
    fn test_truncated_payload_superseded_by_complete_frame() {
        let input = b"data: {\"choices\":[{\"delta\":{\"content\":\"lost\ndata: {\"choices\":[{\"delta\":{\"content\":\"kept\"}}]}\n";
        let frames = decode_all(input);
        assert_eq!(texts(&frames), vec!["kept"]);
    }

    #[test]
    fn test_carry_over_is_bounded() {
        let mut input = String::from("data: {\"choices\":[\n");
        for _ in 0..MAX_PENDING_LINES {
            input.push_str("data: [\n");
        }
        input.push_str("data: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n");
        let mut codec = SseFrameCodec::new();
        let mut buf = BytesMut::from(input.as_bytes());
        let mut frames = Vec::new();
        while let Ok(Some(f)) = codec.decode(&mut buf) {
            frames.push(f);
        }
        assert_eq!(texts(&frames), vec!["after"]);
        assert_eq!(codec.stats().dropped_carry_overs, 1);
    }

    #[test]
    fn test_unterminated_last_line_is_decoded_at_eof() {
        let frames = decode_all(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}");
        assert_eq!(texts(&frames), vec!["tail"]);
    }

    #[test]
    fn test_action_only_payload() {
        let frames = decode_all(
            b"data: {\"action\":{\"type\":\"create_todo\",\"data\":{\"title\":\"Submit SOP\"}}}\n",
        );
        match frames.first() {
            Some(SseFrame::Payload(p)) => {
                assert!(p.delta_content().is_none());
                assert!(p.action.is_some());
            }
            other => panic!("Expected payload, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_field_types_keep_the_action() {
        let frames = decode_all(
            b"data: {\"choices\":null,\"action\":{\"type\":\"create_todo\",\"data\":{\"title\":\"Submit SOP\"}}}\n\
              data: {\"choices\":[{\"delta\":{\"content\":5},\"finish_reason\":1}],\"error\":null}\n\
              data: [DONE]\n",
        );
        assert_eq!(frames.len(), 3);
        match &frames[0] {
            SseFrame::Payload(p) => {
                assert!(p.choices.is_empty());
                assert_eq!(p.action.as_ref().and_then(|a| a["type"].as_str()), Some("create_todo"));
            }
            other => panic!("Expected payload, got {:?}", other),
        }
        match &frames[1] {
            SseFrame::Payload(p) => {
                assert!(p.delta_content().is_none());
                assert!(p.finish_reason().is_none());
                assert!(p.error.is_none());
            }
            other => panic!("Expected payload, got {:?}", other),
        }
        assert_eq!(frames[2], SseFrame::Done);
    }

    #[test]
    fn test_non_object_payload_is_skipped() {
        let mut codec = SseFrameCodec::new();
        let mut buf = BytesMut::from(&b"data: 42\ndata: [DONE]\n"[..]);
        assert_eq!(codec.decode(&mut buf).ok().flatten(), Some(SseFrame::Done));
        assert_eq!(codec.stats().malformed, 1);
    }
}
