use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use tracing::debug;

use crate::error::GemError;
use crate::http::HttpBodyStream;
use crate::types::DecodedEvent;

use super::error::envelope_to_error;
use super::types::GeminiGenerateContentResponse;

/// How response objects are delimited inside the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-sent events: one JSON object per `data:` event, events end on a blank line.
    Sse,
    /// Buffered body: a single JSON object or an array of objects.
    WholeBody,
}

/// Collects an entire body, used to build rich messages for error responses.
pub(crate) async fn collect_stream_text(mut body: HttpBodyStream) -> Result<String, GemError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Incremental decoder turning raw body chunks into [`DecodedEvent`] values.
///
/// Partial bytes are buffered across chunk boundaries, so a chunk boundary never has
/// to coincide with an object boundary. The stream always ends with exactly one
/// terminal event ([`DecodedEvent::Done`] or [`DecodedEvent::Error`]) and then
/// yields `None`. Once the terminal event is queued the body is dropped, which
/// closes the connection and abandons any unread remainder.
pub struct StreamDecoder {
    body: Option<HttpBodyStream>,
    framing: Framing,
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to contain no newline.
    scanned: usize,
    data_lines: Vec<Vec<u8>>,
    pending: VecDeque<DecodedEvent>,
    finished: bool,
}

impl StreamDecoder {
    pub fn new(body: HttpBodyStream, framing: Framing) -> Self {
        Self {
            body: Some(body),
            framing,
            buffer: Vec::new(),
            scanned: 0,
            data_lines: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn finish(&mut self, event: DecodedEvent) {
        if self.finished {
            return;
        }
        self.pending.push_back(event);
        self.finished = true;
        self.body = None;
        self.buffer = Vec::new();
        self.data_lines.clear();
        self.scanned = 0;
    }

    fn fail(&mut self, message: impl Into<String>) {
        self.finish(DecodedEvent::Error(GemError::protocol(message)));
    }

    fn ingest(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if self.framing == Framing::WholeBody {
            return;
        }
        while !self.finished {
            let Some(line) = self.next_line() else {
                break;
            };
            if line.is_empty() {
                self.flush_event();
            } else {
                self.handle_line(line);
            }
        }
    }

    fn next_line(&mut self) -> Option<Vec<u8>> {
        match self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let end = self.scanned + offset;
                let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
                self.scanned = 0;
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Some(line)
            }
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }

    fn handle_line(&mut self, line: Vec<u8>) {
        if let Some(rest) = line.strip_prefix(b"data:") {
            let data = rest.strip_prefix(b" ").unwrap_or(rest);
            self.data_lines.push(data.to_vec());
        } else if !is_sse_field(&line) {
            debug!(line = %preview(&line), "ignoring unknown event stream field");
        }
    }

    fn flush_event(&mut self) {
        if self.data_lines.is_empty() {
            return;
        }
        let joined = self.data_lines.drain(..).collect::<Vec<_>>().join(&b'\n');
        let data = match String::from_utf8(joined) {
            Ok(data) => data,
            Err(err) => return self.fail(format!("invalid UTF-8 in stream chunk: {err}")),
        };
        let payload = data.trim();
        if payload.is_empty() {
            return;
        }
        if payload == "[DONE]" {
            return self.finish(DecodedEvent::Done);
        }
        match serde_json::from_str::<GeminiGenerateContentResponse>(payload) {
            Ok(object) => self.handle_object(object),
            Err(err) => self.fail(format!("malformed stream object: {err}")),
        }
    }

    fn handle_object(&mut self, object: GeminiGenerateContentResponse) {
        if let Some(envelope) = &object.error {
            return self.finish(DecodedEvent::Error(envelope_to_error(envelope)));
        }
        if let Some(reason) = object.block_reason() {
            return self.finish(DecodedEvent::Error(GemError::Blocked {
                reason: reason.to_string(),
            }));
        }

        let text = object.text();
        if !text.is_empty() {
            self.pending.push_back(DecodedEvent::TextDelta(text));
        }

        if let Some(reason) = object.finish_reason() {
            debug!(finish_reason = reason, model = ?object.model_version, "candidate finished");
        }
        if let Some(usage) = &object.usage_metadata {
            debug!(
                prompt_tokens = ?usage.prompt_token_count,
                completion_tokens = ?usage.candidates_token_count,
                total_tokens = ?usage.total_token_count,
                "usage reported"
            );
        }
    }

    fn close(&mut self) {
        match self.framing {
            Framing::Sse => {
                if !self.buffer.is_empty() {
                    let mut line = std::mem::take(&mut self.buffer);
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if !line.starts_with(b"data:") && !is_sse_field(&line) {
                        return self.fail(format!(
                            "event stream ended mid-line: {}",
                            preview(&line)
                        ));
                    }
                    self.handle_line(line);
                }
                // An object still pending here lacked its closing blank line; accept it
                // only when it parses completely.
                self.flush_event();
            }
            Framing::WholeBody => self.decode_whole_body(),
        }
        self.finish(DecodedEvent::Done);
    }

    fn decode_whole_body(&mut self) {
        let body = std::mem::take(&mut self.buffer);
        let text = match std::str::from_utf8(&body) {
            Ok(text) => text.trim(),
            Err(err) => return self.fail(format!("invalid UTF-8 in response body: {err}")),
        };
        if text.is_empty() {
            return;
        }
        let objects = if text.starts_with('[') {
            serde_json::from_str::<Vec<GeminiGenerateContentResponse>>(text)
        } else {
            serde_json::from_str::<GeminiGenerateContentResponse>(text).map(|object| vec![object])
        };
        match objects {
            Ok(objects) => {
                for object in objects {
                    self.handle_object(object);
                    if self.finished {
                        break;
                    }
                }
            }
            Err(err) => self.fail(format!("malformed response body: {err}")),
        }
    }
}

/// Comment and non-data fields defined by the event stream format.
fn is_sse_field(line: &[u8]) -> bool {
    line.starts_with(b":")
        || line.starts_with(b"event:")
        || line.starts_with(b"id:")
        || line.starts_with(b"retry:")
}

fn preview(line: &[u8]) -> String {
    String::from_utf8_lossy(line).chars().take(64).collect()
}

impl Stream for StreamDecoder {
    type Item = DecodedEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(event));
            }
            if this.finished {
                return Poll::Ready(None);
            }
            let Some(body) = this.body.as_mut() else {
                this.finish(DecodedEvent::Done);
                continue;
            };
            match body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.ingest(&bytes),
                Poll::Ready(Some(Err(err))) => this.finish(DecodedEvent::Error(err)),
                Poll::Ready(None) => this.close(),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
