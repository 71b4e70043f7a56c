//! Byte stream → line → [`StreamEvent`] decoding for `/openai/stream`.
//!
//! Lines are split on `\n` before UTF-8 decoding, so a multi-byte character
//! cut across two reads is reassembled. Only lines starting with `data: `
//! carry a payload; malformed payloads are logged and skipped.

use std::collections::VecDeque;
use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use tracing::{trace, warn};

use crate::error::{ClientError, Result};
use crate::messages::StreamEvent;

pub const DATA_PREFIX: &str = "data: ";

/// Incremental line splitter with a per-line size cap.
#[derive(Debug)]
pub struct LineDecoder {
    buf: Vec<u8>,
    max_line_bytes: usize,
}

impl LineDecoder {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line_bytes,
        }
    }

    /// Feed one chunk; returns the lines it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.buf.extend_from_slice(&rest[..pos]);
            self.check_len()?;
            lines.push(self.take_line());
            rest = &rest[pos + 1..];
        }
        self.buf.extend_from_slice(rest);
        self.check_len()?;
        Ok(lines)
    }

    /// Flush the unterminated tail, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn check_len(&self) -> Result<()> {
        if self.buf.len() > self.max_line_bytes {
            return Err(ClientError::Protocol(format!(
                "stream event exceeds {} bytes",
                self.max_line_bytes
            )));
        }
        Ok(())
    }

    fn take_line(&mut self) -> String {
        let mut line = std::mem::take(&mut self.buf);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        match String::from_utf8(line) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

/// Parse one decoded line. `None` for non-data lines and for malformed payloads.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    match StreamEvent::parse(payload) {
        Ok(event) => {
            trace!(?event, "stream event");
            Some(event)
        }
        Err(error) => {
            warn!(%error, payload, "skipping malformed stream event");
            None
        }
    }
}

/// Shared state of the sync and async decoders.
#[derive(Debug)]
struct EventFramer {
    lines: LineDecoder,
    pending: VecDeque<String>,
    bytes_read: usize,
    finished: bool,
}

impl EventFramer {
    fn new(max_line_bytes: usize) -> Self {
        Self {
            lines: LineDecoder::new(max_line_bytes),
            pending: VecDeque::new(),
            bytes_read: 0,
            finished: false,
        }
    }

    fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        self.bytes_read += chunk.len();
        let lines = self.lines.push(chunk)?;
        self.pending.extend(lines);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        if self.bytes_read == 0 {
            return Err(ClientError::Protocol("empty response body".into()));
        }
        if let Some(line) = self.lines.finish() {
            self.pending.push_back(line);
        }
        Ok(())
    }

    fn next_event(&mut self) -> Option<StreamEvent> {
        while let Some(line) = self.pending.pop_front() {
            if let Some(event) = parse_line(&line) {
                return Some(event);
            }
        }
        None
    }
}

/// Pull-based decoder over an iterator of byte chunks.
///
/// Yields events in wire order. After the first error it yields nothing more.
pub struct EventDecoder<I> {
    chunks: I,
    framer: EventFramer,
    failed: bool,
}

impl<I> EventDecoder<I> {
    pub fn new(chunks: I, max_line_bytes: usize) -> Self {
        Self {
            chunks,
            framer: EventFramer::new(max_line_bytes),
            failed: false,
        }
    }
}

impl<I, B, E> Iterator for EventDecoder<I>
where
    I: Iterator<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    type Item = Result<StreamEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(event) = self.framer.next_event() {
                return Some(Ok(event));
            }
            if self.framer.finished {
                return None;
            }
            let step = match self.chunks.next() {
                Some(Ok(chunk)) => self.framer.feed(chunk.as_ref()),
                Some(Err(e)) => Err(ClientError::Network(e.to_string())),
                None => self.framer.finish(),
            };
            if let Err(e) = step {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}

/// Async counterpart of [`EventDecoder`] over a stream of byte chunks.
///
/// The chunk stream is dropped as soon as it ends or fails.
pub fn decode_stream<S, B, E>(
    chunks: S,
    max_line_bytes: usize,
) -> impl Stream<Item = Result<StreamEvent>>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    futures_util::stream::unfold(
        Some((chunks, EventFramer::new(max_line_bytes))),
        |state| async move {
            let (mut chunks, mut framer) = state?;
            loop {
                if let Some(event) = framer.next_event() {
                    return Some((Ok(event), Some((chunks, framer))));
                }
                if framer.finished {
                    return None;
                }
                let step = match chunks.next().await {
                    Some(Ok(chunk)) => framer.feed(chunk.as_ref()),
                    Some(Err(e)) => Err(ClientError::Network(e.to_string())),
                    None => framer.finish(),
                };
                if let Err(e) = step {
                    return Some((Err(e), None));
                }
            }
        },
    )
}
