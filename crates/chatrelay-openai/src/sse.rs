//! SSE → fragment decoding.
//!
//! OpenAI-compatible backends stream Server-Sent Events:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: [DONE]
//! ```
//!
//! This module turns the raw response body into a stream of text fragments,
//! one per non-empty delta. Fragments are yielded as soon as their line is
//! complete and are never merged.

use bytes::{Bytes, BytesMut};
use chatrelay_core::{FragmentStream, GenerationError};
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::models::ChatCompletionChunk;

/// State threaded through the `unfold` stream.
struct DecodeState<S> {
    stream: S,
    buf: BytesMut,
    upstream_done: bool,
    done: bool,
}

/// What a single SSE line means for the fragment stream.
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Skip,
    Fragment(String),
    Done,
    Failed(GenerationError),
}

/// Decode an SSE byte stream into text fragments.
pub fn decode_fragments<S, E>(byte_stream: S) -> FragmentStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = DecodeState {
        stream: byte_stream.boxed(),
        buf: BytesMut::new(),
        upstream_done: false,
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        loop {
            // Try to extract a complete SSE line from the buffer.
            if let Some(line_end) = find_newline(&st.buf) {
                let line = st.buf.split_to(line_end);
                let line = String::from_utf8_lossy(&line);

                match parse_line(&line) {
                    Line::Skip => continue,
                    Line::Fragment(text) => return Some((Ok(text), st)),
                    Line::Done => {
                        debug!("Generation stream finished");
                        return None;
                    }
                    Line::Failed(e) => {
                        st.done = true;
                        return Some((Err(e), st));
                    }
                }
            }

            if st.upstream_done {
                // Flush a trailing line that had no newline.
                if st.buf.is_empty() {
                    return None;
                }
                st.buf.extend_from_slice(b"\n");
                continue;
            }

            // Need more data from upstream.
            match st.stream.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    warn!("Upstream stream error: {e}");
                    st.done = true;
                    return Some((Err(GenerationError::Interrupted(e.to_string())), st));
                }
                None => st.upstream_done = true,
            }
        }
    })
    .boxed()
}

fn parse_line(raw: &str) -> Line {
    let line = raw.trim_end_matches(['\r', '\n']);

    // Blank lines separate events; ':' starts a comment.
    if line.is_empty() || line.starts_with(':') {
        return Line::Skip;
    }

    // `event:`, `id:` and `retry:` carry nothing the relay needs.
    let Some(data) = line.strip_prefix("data:") else {
        return Line::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Line::Done;
    }

    let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => return Line::Failed(GenerationError::Decode(e.to_string())),
    };

    if let Some(error) = chunk.error {
        let message = if error.message.is_empty() {
            error
                .error_type
                .unwrap_or_else(|| "unknown error".to_string())
        } else {
            error.message
        };
        return Line::Failed(GenerationError::Backend(message));
    }

    match chunk.content() {
        Some(text) if !text.is_empty() => Line::Fragment(text.to_string()),
        _ => Line::Skip,
    }
}

/// Find the next newline in the buffer, returning the position after it.
fn find_newline(buf: &BytesMut) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
}
