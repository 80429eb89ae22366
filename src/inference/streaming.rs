//! SSE streaming response parser for chat completions.
//!
//! Buffers the response body as raw bytes, splits it on blank-line frame
//! boundaries (`\n\n`), decodes each frame's `field: value` lines into one
//! JSON object, and normalizes every non-empty frame into a [`StreamChunk`].
//! Chunks come out in arrival order, whatever the read boundaries were.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;

use super::errors::InferenceError;
use super::normalize::normalize_chat;
use super::transport::TransportError;
use super::types::{Parameters, StreamChunk};

const FRAME_DELIMITER: &[u8] = b"\n\n";

/// `data:` payload OpenAI-compatible servers send after the last chunk.
const DONE_SENTINEL: &str = "[DONE]";

// ─── Frame parser ────────────────────────────────────────────────────────────

/// One decoded SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// Fields of the frame merged into one object; may be empty.
    Object(Parameters),
    /// End-of-stream sentinel.
    Done,
}

/// Decode one frame (the text between two blank lines).
///
/// `data` values are JSON objects shallow-merged into the result, later keys
/// winning. `event` lines are ignored, comment lines (leading `:`) skipped,
/// and any other field is stored verbatim as a string.
pub fn parse_sse_frame(frame: &str) -> Result<SseFrame, InferenceError> {
    let mut result = Parameters::new();

    for line in frame.split('\n') {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.trim()),
            None => (line, ""),
        };

        match field {
            "data" => {
                if value == DONE_SENTINEL {
                    return Ok(SseFrame::Done);
                }
                let decoded: Value =
                    serde_json::from_str(value).map_err(|e| InferenceError::DecodeFailed {
                        reason: format!("invalid SSE data: {e} (data: {value})"),
                    })?;
                match decoded {
                    Value::Object(map) => result.extend(map),
                    other => {
                        return Err(InferenceError::StreamError {
                            reason: format!("SSE data is not a JSON object: {other}"),
                        })
                    }
                }
            }
            "event" => {}
            _ => {
                result.insert(field.to_string(), Value::String(value.to_string()));
            }
        }
    }

    Ok(SseFrame::Object(result))
}

// ─── Incremental decoder ─────────────────────────────────────────────────────

/// Incremental frame scanner over a byte stream.
///
/// Holds the bytes of the current, still incomplete frame. Once it has
/// produced an error or seen the `[DONE]` sentinel it is closed and ignores
/// further input.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    closed: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// No more chunks will be produced.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Feed newly read bytes; returns every chunk completed by them, in order.
    ///
    /// The returned list ends at the first error, if any. Only the new bytes
    /// (plus one carried-over byte) are scanned for a frame boundary.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamChunk, InferenceError>> {
        let mut out = Vec::new();
        if self.closed {
            return out;
        }

        // The buffer never holds a complete delimiter between pushes, but its
        // last byte may be the first half of one.
        let mut search_from = self.buffer.len().saturating_sub(FRAME_DELIMITER.len() - 1);
        self.buffer.extend_from_slice(bytes);

        let mut frame_start = 0;
        while let Some(offset) = find_delimiter(&self.buffer[search_from..]) {
            let end = search_from + offset;
            let (item, stop) = decode_frame(&self.buffer[frame_start..end]);
            frame_start = end + FRAME_DELIMITER.len();
            search_from = frame_start;

            let failed = matches!(item, Some(Err(_)));
            out.extend(item);
            if stop || failed {
                self.close();
                return out;
            }
        }

        self.buffer.drain(..frame_start);
        out
    }

    /// Stream ended: decode whatever partial frame is left in the buffer.
    pub fn finish(&mut self) -> Option<Result<StreamChunk, InferenceError>> {
        if self.closed || self.buffer.is_empty() {
            self.closed = true;
            return None;
        }

        let rest = std::mem::take(&mut self.buffer);
        self.closed = true;
        decode_frame(&rest).0
    }

    fn close(&mut self) {
        self.closed = true;
        self.buffer.clear();
    }
}

/// Decode one raw frame. The flag is set when the frame ends the stream.
fn decode_frame(frame: &[u8]) -> (Option<Result<StreamChunk, InferenceError>>, bool) {
    let text = match std::str::from_utf8(frame) {
        Ok(text) => text,
        Err(e) => {
            let err = InferenceError::DecodeFailed {
                reason: format!("SSE frame is not valid UTF-8: {e}"),
            };
            return (Some(Err(err)), true);
        }
    };

    match parse_sse_frame(text) {
        Ok(SseFrame::Object(map)) if map.is_empty() => (None, false),
        Ok(SseFrame::Object(map)) => {
            tracing::debug!(keys = map.len(), "SSE frame");
            (Some(Ok(normalize_chat(&Value::Object(map)))), false)
        }
        Ok(SseFrame::Done) => {
            tracing::debug!("SSE stream done");
            (None, true)
        }
        Err(e) => (Some(Err(e)), true),
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(FRAME_DELIMITER.len())
        .position(|w| w == FRAME_DELIMITER)
}

// ─── Stream adapter ──────────────────────────────────────────────────────────

/// Turn a response byte stream into normalized chat chunks.
///
/// A read error or an undecodable frame is yielded once and ends the stream.
pub fn parse_sse_stream<S>(body: S) -> impl Stream<Item = Result<StreamChunk, InferenceError>>
where
    S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
{
    struct State<S> {
        body: S,
        decoder: SseDecoder,
        pending: VecDeque<Result<StreamChunk, InferenceError>>,
        ended: bool,
    }

    let state = State {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        ended: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.ended = true;
                    state.pending.clear();
                }
                return Some((item, state));
            }

            if state.ended {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.pending.extend(state.decoder.push(&bytes));
                    if state.decoder.is_closed() {
                        state.ended = true;
                    }
                }
                Some(Err(e)) => {
                    state.ended = true;
                    return Some((
                        Err(InferenceError::StreamError {
                            reason: format!("stream read error: {e}"),
                        }),
                        state,
                    ));
                }
                None => {
                    state.ended = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
