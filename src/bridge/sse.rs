//! Incremental Server-Sent Events parser.
//!
//! Fed with raw body chunks as they arrive from `reqwest`; chunk boundaries
//! may fall anywhere, including inside a UTF-8 sequence.

use futures::{Stream, StreamExt};

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    id: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk and returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            id: self.id.clone(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// Adapts a byte stream (e.g. `reqwest::Response::bytes_stream`) into a
/// stream of SSE events. Transport errors end the stream.
pub fn event_stream<S, B, E>(bytes: S) -> impl Stream<Item = SseEvent>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    futures::stream::unfold(
        (bytes, SseParser::new(), std::collections::VecDeque::new()),
        |(mut bytes, mut parser, mut pending)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((event, (bytes, parser, pending)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(parser.push(chunk.as_ref())),
                    Some(Err(e)) => {
                        tracing::debug!("SSE stream ended with error: {}", e);
                        return None;
                    }
                    None => return None,
                }
            }
        },
    )
}
