//! Connect-protocol framing over protobuf.
//!
//! Every message on the wire is an envelope: one flags byte, a big-endian
//! `u32` payload length, then the payload. Requests are a single
//! [`wire::ChatMessage`] envelope; responses are a run of
//! [`wire::ResMessage`] envelopes, optionally closed by an end-of-stream
//! envelope whose payload is JSON.

use crate::error::{CursorError, CursorResult, DecodeDegraded};
use crate::wire::{self, ROLE_OTHER, ROLE_USER};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use curio_protocol::ChatRequest;
use prost::Message;
use serde_json::Value;
use uuid::Uuid;

/// Flags byte plus `u32` length.
pub const HEADER_LEN: usize = 5;

/// Flags bit marking the connect end-of-stream envelope.
pub const FLAG_END_STREAM: u8 = 0x02;

/// Largest envelope payload a response may declare. Anything bigger is
/// treated as undecodable instead of being buffered.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

const PROJECT_PATH: &str = "/path/to/project";

/// One decoded piece of streamed assistant text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFragment {
    pub text: String,
}

impl StreamFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Wire role for a source role string. Only an exact `"user"` maps to the
/// user role.
pub fn wire_role(role: &str) -> i32 {
    if role == "user" {
        ROLE_USER
    } else {
        ROLE_OTHER
    }
}

/// Build the upstream request container for a chat request.
pub fn build_container(request: &ChatRequest) -> wire::ChatMessage {
    let system = request
        .system
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| wire::UserMessage {
            content: s.to_string(),
            role: ROLE_OTHER,
            message_id: Uuid::new_v4().to_string(),
        });

    let messages = system
        .into_iter()
        .chain(request.messages.iter().map(|m| wire::UserMessage {
            content: m.content.to_plaintext(),
            role: wire_role(m.role.as_str()),
            message_id: Uuid::new_v4().to_string(),
        }))
        .collect();

    wire::ChatMessage {
        messages,
        instructions: Some(wire::Instructions {
            instruction: String::new(),
        }),
        project_path: PROJECT_PATH.to_string(),
        model: Some(wire::Model {
            name: request.model.clone(),
            empty: String::new(),
        }),
        request_id: Uuid::new_v4().to_string(),
        summary: String::new(),
        conversation_id: Uuid::new_v4().to_string(),
    }
}

/// Check a container against the constraints the upstream enforces.
pub fn validate_container(container: &wire::ChatMessage) -> CursorResult<()> {
    let model = container
        .model
        .as_ref()
        .ok_or_else(|| CursorError::SchemaViolation("model: object expected".to_string()))?;
    if model.name.is_empty() {
        return Err(CursorError::SchemaViolation(
            "model.name: non-empty string expected".to_string(),
        ));
    }

    for (field, id) in [
        ("requestId", &container.request_id),
        ("conversationId", &container.conversation_id),
    ] {
        Uuid::parse_str(id)
            .map_err(|e| CursorError::SchemaViolation(format!("{}: {}", field, e)))?;
    }

    for (i, message) in container.messages.iter().enumerate() {
        if message.role != ROLE_USER && message.role != ROLE_OTHER {
            return Err(CursorError::SchemaViolation(format!(
                "messages.{}.role: unknown role {}",
                i, message.role
            )));
        }
        Uuid::parse_str(&message.message_id).map_err(|e| {
            CursorError::SchemaViolation(format!("messages.{}.messageId: {}", i, e))
        })?;
    }

    Ok(())
}

/// Frame a payload as a single envelope.
pub fn encode_envelope(flags: u8, payload: &[u8]) -> CursorResult<Bytes> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        CursorError::SchemaViolation(format!("payload of {} bytes exceeds frame limit", payload.len()))
    })?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(flags);
    buf.put_u32(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Encode a chat request as the upstream request body.
pub fn encode_request(request: &ChatRequest) -> CursorResult<Bytes> {
    let container = build_container(request);
    validate_container(&container)?;
    encode_envelope(0, &container.encode_to_vec())
}

/// Result of decoding one run of response bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Fragments(Vec<StreamFragment>),
    /// Structured decoding failed (or the upstream sent an error trailer);
    /// the fragments carry raw text instead.
    Degraded {
        fragments: Vec<StreamFragment>,
        cause: DecodeDegraded,
    },
}

impl Decoded {
    pub fn fragments(&self) -> &[StreamFragment] {
        match self {
            Decoded::Fragments(f) => f,
            Decoded::Degraded { fragments, .. } => fragments,
        }
    }

    pub fn into_fragments(self) -> Vec<StreamFragment> {
        match self {
            Decoded::Fragments(f) => f,
            Decoded::Degraded { fragments, .. } => fragments,
        }
    }

    pub fn degraded(&self) -> Option<&DecodeDegraded> {
        match self {
            Decoded::Fragments(_) => None,
            Decoded::Degraded { cause, .. } => Some(cause),
        }
    }
}

struct Scan {
    fragments: Vec<StreamFragment>,
    consumed: usize,
    error_trailer: Option<String>,
}

impl Scan {
    fn into_decoded(mut self) -> Decoded {
        match self.error_trailer {
            None => Decoded::Fragments(self.fragments),
            Some(trailer) => {
                let cause = DecodeDegraded {
                    reason: "upstream sent an error trailer".to_string(),
                };
                self.fragments.push(StreamFragment::new(trailer));
                Decoded::Degraded {
                    fragments: self.fragments,
                    cause,
                }
            }
        }
    }
}

/// Walk every complete envelope in `buf`. A trailing partial envelope is left
/// unconsumed.
fn scan(buf: &[u8]) -> Result<Scan, DecodeDegraded> {
    let mut fragments = Vec::new();
    let mut error_trailer = None;
    let mut offset = 0;

    while buf.len() - offset >= HEADER_LEN {
        let flags = buf[offset];
        let start = offset + HEADER_LEN;
        let len = (&buf[offset + 1..start]).get_u32() as usize;
        if len > MAX_FRAME_LEN {
            return Err(DecodeDegraded {
                reason: format!("envelope declares {} bytes, limit is {}", len, MAX_FRAME_LEN),
            });
        }
        if len > buf.len() - start {
            break;
        }

        let payload = &buf[start..start + len];
        offset = start + len;

        if flags & FLAG_END_STREAM != 0 {
            if let Some(trailer) = end_stream_error(payload) {
                error_trailer = Some(trailer);
            }
            continue;
        }

        let message = wire::ResMessage::decode(payload).map_err(|e| DecodeDegraded {
            reason: e.to_string(),
        })?;
        if !message.msg.is_empty() {
            fragments.push(StreamFragment::new(message.msg));
        }
    }

    Ok(Scan {
        fragments,
        consumed: offset,
        error_trailer,
    })
}

/// Raw text of an end-of-stream payload that reports an error. A clean `{}`
/// trailer yields `None`.
fn end_stream_error(payload: &[u8]) -> Option<String> {
    let text = || String::from_utf8_lossy(payload).into_owned();
    match serde_json::from_slice::<Value>(payload) {
        Ok(v) => v.get("error").map(|_| text()),
        Err(_) if payload.is_empty() => None,
        Err(_) => Some(text()),
    }
}

/// Pass a run through as text, skipping what would have been its header.
fn fallback(run: &[u8], cause: DecodeDegraded) -> Decoded {
    let text = String::from_utf8_lossy(run.get(HEADER_LEN..).unwrap_or_default());
    let fragments = if text.is_empty() {
        Vec::new()
    } else {
        vec![StreamFragment::new(text)]
    };
    Decoded::Degraded { fragments, cause }
}

/// Decode one self-contained chunk. A trailing partial envelope is dropped.
pub fn decode_chunk(chunk: &[u8]) -> Decoded {
    match scan(chunk) {
        Ok(scan) => scan.into_decoded(),
        Err(e) => fallback(chunk, e),
    }
}

/// Incremental decoder that carries a partial envelope over to the next read.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next network read and decode every envelope it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Decoded {
        self.buffer.extend_from_slice(chunk);
        match scan(&self.buffer) {
            Ok(scan) => {
                self.buffer.advance(scan.consumed);
                scan.into_decoded()
            }
            Err(e) => {
                let run = self.buffer.split();
                fallback(&run, e)
            }
        }
    }

    /// Bytes held back waiting for the rest of an envelope.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// End of input; returns the number of bytes that never formed a full
    /// envelope.
    pub fn finish(self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curio_protocol::{ChatMessage, Role};

    fn res_envelope(text: &str) -> Vec<u8> {
        let payload = wire::ResMessage {
            msg: text.to_string(),
        }
        .encode_to_vec();
        encode_envelope(0, &payload).unwrap().to_vec()
    }

    fn stream_of(texts: &[&str]) -> Vec<u8> {
        texts.iter().flat_map(|t| res_envelope(t)).collect()
    }

    fn request() -> ChatRequest {
        ChatRequest::new(
            "claude-3.5-sonnet",
            vec![
                ChatMessage::system("be brief"),
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
                ChatMessage::new(Role::Tool, "42"),
            ],
        )
    }

    #[test]
    fn envelope_length_matches_payload() {
        let encoded = encode_request(&request()).unwrap();
        assert_eq!(encoded[0], 0);
        let len = (&encoded[1..HEADER_LEN]).get_u32() as usize;
        assert_eq!(len, encoded.len() - HEADER_LEN);
    }

    #[test]
    fn encoded_request_carries_messages_in_order() {
        let encoded = encode_request(&request()).unwrap();
        let container = wire::ChatMessage::decode(&encoded[HEADER_LEN..]).unwrap();

        let contents: Vec<_> = container.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["be brief", "hi", "hello", "42"]);
        let roles: Vec<_> = container.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [ROLE_OTHER, ROLE_USER, ROLE_OTHER, ROLE_OTHER]);

        assert_eq!(container.model.unwrap().name, "claude-3.5-sonnet");
        assert_eq!(container.project_path, PROJECT_PATH);
        assert_eq!(container.instructions.unwrap().instruction, "");
        assert!(container.summary.is_empty());
        assert_ne!(container.request_id, container.conversation_id);
        for m in &container.messages {
            assert!(Uuid::parse_str(&m.message_id).is_ok());
        }
    }

    #[test]
    fn system_field_becomes_leading_message() {
        let mut req = ChatRequest::new("gpt-4o", vec![ChatMessage::user("hi")]);
        req.system = Some("you are terse".to_string());
        let container = build_container(&req);
        assert_eq!(container.messages.len(), 2);
        assert_eq!(container.messages[0].content, "you are terse");
        assert_eq!(container.messages[0].role, ROLE_OTHER);
    }

    #[test]
    fn role_mapping_is_exact() {
        assert_eq!(wire_role("user"), ROLE_USER);
        for other in ["assistant", "system", "tool", "developer", "User", "wizard", ""] {
            assert_eq!(wire_role(other), ROLE_OTHER, "{}", other);
        }
    }

    #[test]
    fn empty_model_is_a_schema_violation() {
        let req = ChatRequest::new("", vec![ChatMessage::user("hi")]);
        let err = encode_request(&req).unwrap_err();
        assert!(matches!(err, CursorError::SchemaViolation(_)));
    }

    #[test]
    fn bad_role_is_a_schema_violation() {
        let mut container = build_container(&request());
        container.messages[1].role = 7;
        let err = validate_container(&container).unwrap_err();
        assert!(err.to_string().contains("messages.1.role"));
    }

    #[test]
    fn decodes_concatenated_envelopes() {
        let decoded = decode_chunk(&stream_of(&["Hel", "lo"]));
        assert_eq!(
            decoded,
            Decoded::Fragments(vec![StreamFragment::new("Hel"), StreamFragment::new("lo")])
        );
    }

    #[test]
    fn empty_messages_produce_no_fragments() {
        let decoded = decode_chunk(&stream_of(&["", "x", ""]));
        assert_eq!(decoded.fragments(), &[StreamFragment::new("x")]);
        assert!(decode_chunk(&[]).fragments().is_empty());
    }

    #[test]
    fn trailing_partial_envelope_is_dropped_by_chunk_decoder() {
        let mut bytes = stream_of(&["one", "two"]);
        bytes.truncate(bytes.len() - 2);
        assert_eq!(decode_chunk(&bytes).fragments(), &[StreamFragment::new("one")]);
    }

    #[test]
    fn frame_decoder_joins_envelopes_split_across_reads() {
        let bytes = stream_of(&["Hel", "lo", ", world"]);
        for split in 0..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut text = String::new();
            for part in [&bytes[..split], &bytes[split..]] {
                for f in decoder.push(part).into_fragments() {
                    text.push_str(&f.text);
                }
            }
            assert_eq!(text, "Hello, world", "split at {}", split);
            assert_eq!(decoder.finish(), 0);
        }
    }

    #[test]
    fn frame_decoder_reports_leftover() {
        let mut bytes = res_envelope("abc");
        bytes.truncate(4);
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&bytes).fragments().is_empty());
        assert_eq!(decoder.pending(), 4);
        assert_eq!(decoder.finish(), 4);
    }

    #[test]
    fn undecodable_chunk_falls_back_to_text() {
        // Field 1 declares 127 bytes but only 4 follow.
        let chunk = encode_envelope(0, &[0x0A, 0x7F, b'o', b'o', b'p', b's']).unwrap();
        let decoded = decode_chunk(&chunk);
        assert!(decoded.degraded().is_some());
        assert_eq!(
            decoded.fragments(),
            &[StreamFragment::new(String::from_utf8_lossy(&chunk[HEADER_LEN..]))]
        );
    }

    #[test]
    fn fallback_covers_the_whole_chunk() {
        let mut chunk = res_envelope("fine");
        chunk.extend_from_slice(&encode_envelope(0, &[0x0A, 0x7F]).unwrap());
        let decoded = decode_chunk(&chunk);
        assert!(decoded.degraded().is_some());
        assert_eq!(decoded.fragments().len(), 1);
        assert_eq!(
            decoded.fragments()[0].text,
            String::from_utf8_lossy(&chunk[HEADER_LEN..])
        );
    }

    #[test]
    fn clean_end_of_stream_trailer_is_ignored() {
        let mut chunk = stream_of(&["done"]);
        chunk.extend_from_slice(&encode_envelope(FLAG_END_STREAM, b"{}").unwrap());
        assert_eq!(
            decode_chunk(&chunk),
            Decoded::Fragments(vec![StreamFragment::new("done")])
        );
    }

    #[test]
    fn error_trailer_is_surfaced_as_text() {
        let trailer = br#"{"error":{"code":"unauthenticated","message":"bad token"}}"#;
        let mut chunk = stream_of(&["partial"]);
        chunk.extend_from_slice(&encode_envelope(FLAG_END_STREAM, trailer).unwrap());
        let decoded = decode_chunk(&chunk);
        assert!(decoded.degraded().is_some());
        let texts: Vec<_> = decoded.fragments().iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, ["partial", std::str::from_utf8(trailer).unwrap()]);
    }

    #[test]
    fn oversized_envelope_is_not_buffered() {
        let mut decoder = FrameDecoder::new();
        let mut chunk = vec![0, 0xFF, 0xFF, 0xFF, 0xFF];
        chunk.extend_from_slice(b"junk");

        let decoded = decoder.push(&chunk);
        assert!(decoded.degraded().is_some());
        assert_eq!(decoded.fragments(), &[StreamFragment::new("junk")]);
        assert_eq!(decoder.pending(), 0);

        let junk = vec![b'x'; 1024 * 1024];
        for _ in 0..4 {
            assert!(decoder.push(&junk).degraded().is_some());
            assert_eq!(decoder.pending(), 0);
        }
        assert_eq!(decoder.finish(), 0);
    }

    #[test]
    fn envelope_at_the_limit_still_waits_for_its_body() {
        let mut header = vec![0];
        header.extend_from_slice(&(MAX_FRAME_LEN as u32).to_be_bytes());
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(&header), Decoded::Fragments(Vec::new()));
        assert_eq!(decoder.pending(), HEADER_LEN);
    }
}
