//! Splitting streamed bodies into frames

use std::pin::Pin;

use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt, stream};

use crate::error::LlmError;
use crate::transport::ByteStream;

/// Payload strings in arrival order
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// How a streaming body is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-sent events; each `data:` payload is a frame
    Sse,
    /// One JSON document per line
    Ndjson,
}

/// Decoded meaning of one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text fragment to hand to the caller
    Text(String),
    /// Keep-alive, metadata, or an empty delta
    Skip,
    /// Backend signalled the end of the stream
    Done,
}

pub fn frames(bytes: ByteStream, framing: Framing) -> FrameStream {
    match framing {
        Framing::Sse => sse_frames(bytes),
        Framing::Ndjson => ndjson_frames(bytes),
    }
}

fn sse_frames(bytes: ByteStream) -> FrameStream {
    let events = bytes.eventsource().filter_map(|event| async move {
        match event {
            Ok(event) if event.data.trim().is_empty() => None,
            Ok(event) => Some(Ok(event.data)),
            Err(EventStreamError::Transport(e)) => Some(Err(e)),
            Err(e) => Some(Err(LlmError::Parse(format!("malformed event stream: {e}")))),
        }
    });

    Box::pin(events)
}

struct LineState {
    bytes: ByteStream,
    buffer: Vec<u8>,
    exhausted: bool,
}

fn ndjson_frames(bytes: ByteStream) -> FrameStream {
    let state = LineState {
        bytes,
        buffer: Vec::new(),
        exhausted: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(end) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=end).collect();
                match decode_line(&line) {
                    Ok(Some(line)) => return Some((Ok(line), state)),
                    Ok(None) => continue,
                    Err(e) => {
                        state.buffer.clear();
                        state.exhausted = true;
                        return Some((Err(e), state));
                    }
                }
            }

            if state.exhausted {
                let rest = std::mem::take(&mut state.buffer);
                return match decode_line(&rest) {
                    Ok(Some(line)) => Some((Ok(line), state)),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), state)),
                };
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.buffer.clear();
                    state.exhausted = true;
                    return Some((Err(e), state));
                }
                None => state.exhausted = true,
            }
        }
    }))
}

fn decode_line(line: &[u8]) -> Result<Option<String>, LlmError> {
    let text = std::str::from_utf8(line).map_err(|e| LlmError::Parse(format!("stream line is not UTF-8: {e}")))?;
    let text = text.trim();

    Ok((!text.is_empty()).then(|| text.to_owned()))
}
