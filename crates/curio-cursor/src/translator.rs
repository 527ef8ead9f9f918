//! Reassembly of the upstream response stream.
//!
//! The response body is consumed read by read: each read is fed to a
//! [`FrameDecoder`] and the resulting fragments are surfaced in arrival order,
//! either as a stream (for SSE relaying) or folded into an
//! [`AggregatedResponse`].

use crate::codec::{FrameDecoder, StreamFragment};
use crate::error::{CursorError, CursorResult};
use async_stream::try_stream;
use bytes::Bytes;
use chrono::Utc;
use curio_protocol::{ChatCompletion, ChatCompletionChunk};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

/// Incremental event delivered while a response is being translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslatorEvent {
    Delta(String),
    Done,
}

/// Identity shared by every chunk of one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionMeta {
    pub id: String,
    pub created_at: i64,
    pub model: String,
}

impl CompletionMeta {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
            created_at: Utc::now().timestamp(),
            model: model.into(),
        }
    }

    pub fn delta_chunk(&self, content: impl Into<String>) -> ChatCompletionChunk {
        ChatCompletionChunk::delta(&self.id, self.created_at, &self.model, content)
    }

    pub fn stop_chunk(&self) -> ChatCompletionChunk {
        ChatCompletionChunk::stop(&self.id, self.created_at, &self.model)
    }
}

/// The fully assembled assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedResponse {
    pub id: String,
    pub created_at: i64,
    pub model: String,
    pub content: String,
}

impl AggregatedResponse {
    pub fn into_completion(self) -> ChatCompletion {
        ChatCompletion::new(self.id, self.created_at, self.model, self.content)
    }
}

/// Decode a response body into fragments, in order.
///
/// Degraded decodes are logged and passed through. A read error ends the
/// stream with [`CursorError::Interrupted`].
pub fn fragments<S, E>(body: S) -> impl Stream<Item = CursorResult<StreamFragment>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    try_stream! {
        let mut body = Box::pin(body);
        let mut decoder = FrameDecoder::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| CursorError::Interrupted(Box::new(e)))?;
            let decoded = decoder.push(&chunk);
            if let Some(cause) = decoded.degraded() {
                warn!(error = %cause, bytes = chunk.len(), "upstream response did not decode cleanly");
            }
            for fragment in decoded.into_fragments() {
                yield fragment;
            }
        }

        let leftover = decoder.finish();
        if leftover > 0 {
            warn!(leftover, "discarding incomplete envelope at end of stream");
        }
    }
}

/// Fold a response body into an [`AggregatedResponse`].
pub async fn translate<S, E>(body: S, model: &str) -> CursorResult<AggregatedResponse>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    translate_with(body, model, |_| {}).await
}

/// Like [`translate`], delivering each fragment to `on_event` before the next
/// read and a single [`TranslatorEvent::Done`] once the body closes.
pub async fn translate_with<S, E, F>(
    body: S,
    model: &str,
    mut on_event: F,
) -> CursorResult<AggregatedResponse>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: FnMut(TranslatorEvent),
{
    let meta = CompletionMeta::new(model);
    let mut stream = Box::pin(fragments(body));
    let mut content = String::new();
    let mut count = 0usize;

    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        count += 1;
        content.push_str(&fragment.text);
        on_event(TranslatorEvent::Delta(fragment.text));
    }
    on_event(TranslatorEvent::Done);

    debug!(id = %meta.id, fragments = count, chars = content.len(), "upstream stream complete");

    Ok(AggregatedResponse {
        id: meta.id,
        created_at: meta.created_at,
        model: meta.model,
        content,
    })
}
