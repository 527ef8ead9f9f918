//! Streaming conversion (SSE).
//!
//! The upstream streams binary envelopes; OpenAI clients expect
//! `data: {chat.completion.chunk}` frames closed by `data: [DONE]`. Each
//! decoded fragment becomes one frame as soon as it arrives.

use anyhow::Result;
use async_stream::try_stream;
use bytes::Bytes;
use curio_cursor::{fragments, CompletionMeta};
use curio_protocol::SSE_DONE;
use futures::{Stream, StreamExt};
use tracing::debug;

/// Convert an upstream response body into OpenAI SSE frames.
///
/// The returned stream owns the upstream body. Dropping it early (the client
/// disconnected) drops the body and closes the upstream connection.
pub fn handle_streaming<S, E>(body: S, meta: CompletionMeta) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    try_stream! {
        let mut upstream = Box::pin(fragments(body));
        let mut count = 0usize;

        while let Some(fragment) = upstream.next().await {
            let fragment = fragment?;
            count += 1;
            yield meta.delta_chunk(fragment.text).to_sse()?;
        }

        yield meta.stop_chunk().to_sse()?;
        yield SSE_DONE.to_string();

        debug!(id = %meta.id, fragments = count, "stream relayed");
    }
}
