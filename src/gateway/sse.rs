//! Server-Sent-Events plumbing shared by every provider stream parser.
//!
//! Upstreams frame their streams as SSE chunks separated by blank lines.
//! [`SseChunkReader`] does the byte-level framing; [`StreamParser`] lifts raw
//! chunks into a uniform event taxonomy so the rest of the gateway never has
//! to know which SSE dialect a provider speaks.  The parser deliberately
//! never deserializes payload JSON; consumers decide what, if anything, to
//! decode.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::gateway::error::GatewayError;

/// Terminal frame written downstream on every streaming exit path.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Sentinel payload marking end-of-stream in the OpenAI dialect.
pub const DONE_PAYLOAD: &str = "[DONE]";

/// Wrap a raw payload into a complete `data: …\n\n` frame.
pub fn data_frame(payload: &str) -> String {
    format!("data: {}\n\n", payload)
}

/// One blank-line-delimited SSE chunk, split into its `event` and `data`
/// fields.  Unknown fields (`id:`, `retry:`, comments) are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseChunk {
    pub event: Option<String>,
    pub data: Option<String>,
}

impl SseChunk {
    /// Parse the text between two blank-line boundaries.
    ///
    /// Multiple `data:` lines are joined with `\n`, per the SSE wire format.
    pub fn parse(raw: &str) -> Self {
        let mut event = None;
        let mut data_lines: Vec<&str> = Vec::new();
        for line in raw.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value.strip_prefix(' ').unwrap_or(value));
            } else if let Some(value) = line.strip_prefix("event:") {
                event = Some(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        let data = if data_lines.is_empty() {
            None
        } else {
            Some(data_lines.join("\n"))
        };
        SseChunk { event, data }
    }

    /// Whether this chunk is the conventional `[DONE]` terminator.
    pub fn is_done(&self) -> bool {
        self.data.as_deref() == Some(DONE_PAYLOAD)
    }
}

/// Buffered reader that turns a byte stream into [`SseChunk`]s.
///
/// Chunks are delimited by a blank line; a trailing partial chunk at EOF is
/// still delivered so short upstream writes are not lost.
pub struct SseChunkReader<S> {
    stream: S,
    buf: Vec<u8>,
    eof: bool,
}

impl<S> SseChunkReader<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            eof: false,
        }
    }

    /// Next chunk, or `None` once the upstream body is exhausted.
    pub async fn next_chunk(&mut self) -> Result<Option<SseChunk>, GatewayError> {
        loop {
            if let Some((boundary, sep_len)) = find_boundary(&self.buf) {
                let raw: Vec<u8> = self.buf.drain(..boundary + sep_len).collect();
                let text = String::from_utf8_lossy(&raw[..boundary]).into_owned();
                if text.trim().is_empty() {
                    continue;
                }
                return Ok(Some(SseChunk::parse(&text)));
            }

            if self.eof {
                if self.buf.iter().all(|b| b.is_ascii_whitespace()) {
                    return Ok(None);
                }
                let text = String::from_utf8_lossy(&self.buf).into_owned();
                self.buf.clear();
                return Ok(Some(SseChunk::parse(&text)));
            }

            match self.stream.next().await {
                Some(Ok(bytes)) => self.buf.extend_from_slice(&bytes),
                Some(Err(err)) => return Err(GatewayError::Stream(err.to_string())),
                None => self.eof = true,
            }
        }
    }
}

/// Offset and length of the first blank-line boundary (`\n\n` or `\r\n\r\n`).
fn find_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Uniform event taxonomy emitted by every provider stream parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventKind {
    StreamStart,
    MessageStart,
    ContentStart,
    ContentDelta,
    ContentEnd,
    MessageEnd,
    StreamEnd,
}

impl StreamEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEventKind::StreamStart => "stream-start",
            StreamEventKind::MessageStart => "message-start",
            StreamEventKind::ContentStart => "content-start",
            StreamEventKind::ContentDelta => "content-delta",
            StreamEventKind::ContentEnd => "content-end",
            StreamEventKind::MessageEnd => "message-end",
            StreamEventKind::StreamEnd => "stream-end",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "stream-start" => Some(StreamEventKind::StreamStart),
            "message-start" => Some(StreamEventKind::MessageStart),
            "content-start" => Some(StreamEventKind::ContentStart),
            "content-delta" => Some(StreamEventKind::ContentDelta),
            "content-end" => Some(StreamEventKind::ContentEnd),
            "message-end" => Some(StreamEventKind::MessageEnd),
            "stream-end" => Some(StreamEventKind::StreamEnd),
            _ => None,
        }
    }
}

/// Classified event with its raw (undecoded) payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    pub data: String,
}

/// How a provider frames its stream.
///
/// Cohere names its events on the wire; the JSON-delta dialects are told
/// apart by markers inside the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseDialect {
    /// `event:` lines carry the taxonomy name directly (Cohere).
    Named,
    /// OpenAI-compatible deltas (OpenAI, Groq, DeepSeek, Qwen, HuggingFace,
    /// Cloudflare).
    OpenAi,
    /// Anthropic `type`-tagged events.
    Anthropic,
    /// Ollama `done`-flagged deltas.
    Ollama,
}

/// Lifts raw [`SseChunk`]s into [`StreamEvent`]s for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct StreamParser {
    dialect: SseDialect,
}

impl StreamParser {
    pub fn new(dialect: SseDialect) -> Self {
        Self { dialect }
    }

    /// Classify a chunk.  Unrecognized shapes default to `content-delta`.
    pub fn classify(&self, chunk: &SseChunk) -> StreamEvent {
        if chunk.is_done() {
            return StreamEvent {
                kind: StreamEventKind::StreamEnd,
                data: DONE_PAYLOAD.to_string(),
            };
        }
        let data = chunk.data.clone().unwrap_or_default();
        let kind = match self.dialect {
            SseDialect::Named => chunk
                .event
                .as_deref()
                .and_then(StreamEventKind::from_name)
                .unwrap_or(StreamEventKind::ContentDelta),
            SseDialect::OpenAi => classify_openai(&data),
            SseDialect::Anthropic => classify_anthropic(&data),
            SseDialect::Ollama => classify_ollama(&data),
        };
        StreamEvent { kind, data }
    }

    /// Re-frame an event as SSE text.  `classify(parse(serialize(e))) == e`
    /// holds for the named dialect across the whole taxonomy.
    pub fn serialize(&self, event: &StreamEvent) -> String {
        if event.kind == StreamEventKind::StreamEnd {
            return DONE_FRAME.to_string();
        }
        match self.dialect {
            SseDialect::Named => format!("event: {}\ndata: {}\n\n", event.kind.as_str(), event.data),
            _ => data_frame(&event.data),
        }
    }
}

fn classify_openai(data: &str) -> StreamEventKind {
    // A terminal finish_reason marks the end of the message; everything else
    // in this dialect is an incremental delta.
    if data.contains("\"finish_reason\"") && !data.contains("\"finish_reason\":null") {
        StreamEventKind::MessageEnd
    } else {
        StreamEventKind::ContentDelta
    }
}

fn classify_anthropic(data: &str) -> StreamEventKind {
    if data.contains("\"message_start\"") {
        StreamEventKind::MessageStart
    } else if data.contains("\"content_block_start\"") {
        StreamEventKind::ContentStart
    } else if data.contains("\"content_block_stop\"") {
        StreamEventKind::ContentEnd
    } else if data.contains("\"message_stop\"") {
        StreamEventKind::MessageEnd
    } else {
        StreamEventKind::ContentDelta
    }
}

fn classify_ollama(data: &str) -> StreamEventKind {
    if data.contains("\"done\":true") || data.contains("\"done\": true") {
        StreamEventKind::MessageEnd
    } else {
        StreamEventKind::ContentDelta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_and_joined_data_lines() {
        let chunk = SseChunk::parse("event: content-delta\ndata: part one\ndata: part two");
        assert_eq!(chunk.event.as_deref(), Some("content-delta"));
        assert_eq!(chunk.data.as_deref(), Some("part one\npart two"));
    }

    #[test]
    fn done_sentinel_is_detected() {
        let chunk = SseChunk::parse("data: [DONE]");
        assert!(chunk.is_done());
        let event = StreamParser::new(SseDialect::OpenAi).classify(&chunk);
        assert_eq!(event.kind, StreamEventKind::StreamEnd);
    }

    #[test]
    fn openai_finish_reason_classifies_message_end() {
        let parser = StreamParser::new(SseDialect::OpenAi);
        let delta = SseChunk::parse(r#"data: {"choices":[{"delta":{"content":"hi"},"finish_reason":null}]}"#);
        assert_eq!(parser.classify(&delta).kind, StreamEventKind::ContentDelta);
        let end = SseChunk::parse(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        assert_eq!(parser.classify(&end).kind, StreamEventKind::MessageEnd);
    }

    #[test]
    fn anthropic_markers_map_to_taxonomy() {
        let parser = StreamParser::new(SseDialect::Anthropic);
        let cases = [
            (r#"{"type":"message_start"}"#, StreamEventKind::MessageStart),
            (r#"{"type":"content_block_start"}"#, StreamEventKind::ContentStart),
            (r#"{"type":"content_block_delta"}"#, StreamEventKind::ContentDelta),
            (r#"{"type":"content_block_stop"}"#, StreamEventKind::ContentEnd),
            (r#"{"type":"message_stop"}"#, StreamEventKind::MessageEnd),
        ];
        for (payload, expected) in cases {
            let chunk = SseChunk {
                event: None,
                data: Some(payload.to_string()),
            };
            assert_eq!(parser.classify(&chunk).kind, expected, "payload {}", payload);
        }
    }

    #[test]
    fn named_dialect_round_trips_every_kind() {
        let parser = StreamParser::new(SseDialect::Named);
        let kinds = [
            StreamEventKind::StreamStart,
            StreamEventKind::MessageStart,
            StreamEventKind::ContentStart,
            StreamEventKind::ContentDelta,
            StreamEventKind::ContentEnd,
            StreamEventKind::MessageEnd,
            StreamEventKind::StreamEnd,
        ];
        for kind in kinds {
            let event = StreamEvent {
                kind,
                data: if kind == StreamEventKind::StreamEnd {
                    DONE_PAYLOAD.to_string()
                } else {
                    format!("{{\"k\":\"{}\"}}", kind.as_str())
                },
            };
            let framed = parser.serialize(&event);
            let body = framed.trim_end_matches('\n');
            let reparsed = parser.classify(&SseChunk::parse(body));
            assert_eq!(reparsed, event);
        }
    }

    #[tokio::test]
    async fn reader_splits_on_blank_lines_and_flushes_tail() {
        let frames: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"data: one\n\nda")),
            Ok(Bytes::from_static(b"ta: two\n\ndata: tail")),
        ];
        let mut reader = SseChunkReader::new(futures_util::stream::iter(frames));
        assert_eq!(
            reader.next_chunk().await.unwrap().unwrap().data.as_deref(),
            Some("one")
        );
        assert_eq!(
            reader.next_chunk().await.unwrap().unwrap().data.as_deref(),
            Some("two")
        );
        assert_eq!(
            reader.next_chunk().await.unwrap().unwrap().data.as_deref(),
            Some("tail")
        );
        assert!(reader.next_chunk().await.unwrap().is_none());
    }
}
