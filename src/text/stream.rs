//! Incremental decoding of the text generation event stream.
//!
//! The body is a run of records separated by a blank line. Each record is a
//! five byte framing prefix (`data:`) followed by a JSON object whose `text`
//! member is the next fragment. Records can be split across network chunks.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::error::{PerchanceError, Result};

const RECORD_SEPARATOR: &[u8] = b"\n\n";
const FRAME_PREFIX_LEN: usize = 5;

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    text: Option<String>,
}

/// Reassembles records from arbitrary chunk boundaries.
#[derive(Debug, Default)]
pub(crate) struct EventDecoder {
    buffer: Vec<u8>,
}

impl EventDecoder {
    /// Feeds a chunk and returns one item per record it completes.
    ///
    /// Decoding stops at the first bad record, whose error is the last item.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Result<String>> {
        self.buffer.extend_from_slice(chunk);

        let mut decoded = Vec::new();
        while let Some(end) = find_separator(&self.buffer) {
            let record: Vec<u8> = self.buffer.drain(..end + RECORD_SEPARATOR.len()).collect();
            match decode_record(&record[..end]) {
                Ok(Some(text)) => decoded.push(Ok(text)),
                Ok(None) => {}
                Err(e) => {
                    decoded.push(Err(e));
                    break;
                }
            }
        }
        decoded
    }

    /// Decodes whatever is left once the connection has closed.
    pub(crate) fn finish(&mut self) -> Result<Option<String>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_record(&rest)
    }
}

fn find_separator(buf: &[u8]) -> Option<usize> {
    buf.windows(RECORD_SEPARATOR.len())
        .position(|w| w == RECORD_SEPARATOR)
}

fn decode_record(raw: &[u8]) -> Result<Option<String>> {
    let record = std::str::from_utf8(raw).map_err(|e| {
        PerchanceError::Connection(format!("text stream record is not UTF-8: {e}"))
    })?;
    let record = record.trim_matches(['\r', '\n']);
    if record.trim().is_empty() {
        return Ok(None);
    }

    let payload = record.get(FRAME_PREFIX_LEN..).ok_or_else(|| {
        PerchanceError::Connection(format!("truncated text stream record: {record:?}"))
    })?;
    let event: StreamEvent = serde_json::from_str(payload)?;
    Ok(event.text)
}

struct StreamState<S> {
    body: Pin<Box<S>>,
    decoder: EventDecoder,
    pending: VecDeque<Result<String>>,
    closed: bool,
}

async fn next_fragment<S, E>(mut state: StreamState<S>) -> Result<Option<(String, StreamState<S>)>>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<PerchanceError>,
{
    loop {
        match state.pending.pop_front() {
            Some(Ok(fragment)) => return Ok(Some((fragment, state))),
            Some(Err(e)) => return Err(e),
            None => {}
        }
        if state.closed {
            return Ok(None);
        }

        match state.body.next().await {
            Some(Ok(chunk)) => {
                let decoded = state.decoder.push(&chunk);
                state.pending.extend(decoded);
            }
            Some(Err(e)) => {
                let cause: PerchanceError = e.into();
                return Err(PerchanceError::Connection(format!(
                    "text stream interrupted: {cause}"
                )));
            }
            None => {
                state.closed = true;
                state.pending.extend(state.decoder.finish().transpose());
            }
        }
    }
}

/// Generated text, delivered fragment by fragment as the server sends it.
///
/// Single pass and finite. An error ends the stream; fragments already
/// yielded stay valid.
#[must_use = "streams do nothing unless polled"]
pub struct TextStream {
    inner: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
}

impl TextStream {
    pub(crate) fn from_body<S, E>(body: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<PerchanceError> + Send + 'static,
    {
        let state = StreamState {
            body: Box::pin(body),
            decoder: EventDecoder::default(),
            pending: VecDeque::new(),
            closed: false,
        };
        Self {
            inner: Box::pin(futures::stream::try_unfold(state, next_fragment::<S, E>)),
        }
    }

    /// Drains the stream into one string.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(fragment) = self.next().await {
            out.push_str(&fragment?);
        }
        Ok(out)
    }
}

impl Stream for TextStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for TextStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextStream").finish_non_exhaustive()
    }
}
