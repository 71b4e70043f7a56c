//! Stream Consumer: turns the `/openai/stream` body into a [`SearchResult`].
//!
//! One [`StreamSession`] lives for one call. Text is append-only and every
//! delta is published to the observer as soon as it is applied.

use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tracing::debug;

use crate::config::{EndOfStreamPolicy, QueryConfig, StreamLimits};
use crate::decoder::decode_stream;
use crate::error::{ClientError, Result};
use crate::messages::{SearchResult, SourceDocument, StreamEvent};

/// Receives incremental progress of a streaming session.
pub trait StreamObserver: Send {
    /// Called after each delta with the full text accumulated so far.
    fn on_text(&mut self, accumulated: &str);

    /// Called when the document list is replaced.
    fn on_documents(&mut self, _documents: &[SourceDocument]) {}
}

impl StreamObserver for () {
    fn on_text(&mut self, _accumulated: &str) {}
}

impl StreamObserver for watch::Sender<String> {
    fn on_text(&mut self, accumulated: &str) {
        self.send_replace(accumulated.to_string());
    }
}

/// Adapts a closure over the accumulated text.
pub struct FnObserver<F>(pub F);

impl<F> StreamObserver for FnObserver<F>
where
    F: FnMut(&str) + Send,
{
    fn on_text(&mut self, accumulated: &str) {
        (self.0)(accumulated)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TerminalState {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// Mutable state of one streaming call.
#[derive(Debug, Default)]
pub struct StreamSession {
    accumulated_text: String,
    source_documents: Vec<SourceDocument>,
    terminal_state: TerminalState,
}

impl StreamSession {
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn source_documents(&self) -> &[SourceDocument] {
        &self.source_documents
    }

    pub fn terminal_state(&self) -> TerminalState {
        self.terminal_state
    }

    /// Apply one event. A failure event moves to `Failed` and returns the upstream message.
    pub fn apply(&mut self, event: StreamEvent, observer: &mut dyn StreamObserver) -> Result<()> {
        match event {
            StreamEvent::SourceDocuments(documents) => {
                debug!(count = documents.len(), "source documents received");
                self.source_documents = documents;
                observer.on_documents(&self.source_documents);
            }
            StreamEvent::TextDelta(delta) => {
                self.accumulated_text.push_str(&delta);
                observer.on_text(&self.accumulated_text);
            }
            StreamEvent::StreamCompleted => {
                self.terminal_state = TerminalState::Completed;
            }
            StreamEvent::Failed(message) => {
                self.terminal_state = TerminalState::Failed;
                return Err(ClientError::Protocol(message));
            }
            StreamEvent::ResponseCreated | StreamEvent::Other(_) => {}
        }
        Ok(())
    }

    pub fn into_result(self) -> SearchResult {
        SearchResult {
            answer: self.accumulated_text,
            source_documents: self.source_documents,
        }
    }
}

/// Drives a [`StreamSession`] from a byte stream to a terminal result.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamConsumer {
    pub end_of_stream: EndOfStreamPolicy,
    pub limits: StreamLimits,
}

impl StreamConsumer {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            end_of_stream: config.end_of_stream,
            limits: config.limits,
        }
    }

    /// Consume raw byte chunks. The stream is dropped on every exit path,
    /// including timeout.
    pub async fn consume<S, B, E>(
        &self,
        chunks: S,
        observer: &mut dyn StreamObserver,
    ) -> Result<SearchResult>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin + Send,
        B: AsRef<[u8]> + Send,
        E: Display + Send,
    {
        let events = decode_stream(chunks, self.limits.max_line_bytes);
        let max_duration = self.limits.max_duration;
        match tokio::time::timeout(max_duration, self.consume_events(events, observer)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(max_duration)),
        }
    }

    /// Consume already-decoded events.
    pub async fn consume_events<S>(
        &self,
        events: S,
        observer: &mut dyn StreamObserver,
    ) -> Result<SearchResult>
    where
        S: Stream<Item = Result<StreamEvent>>,
    {
        let mut events = std::pin::pin!(events);
        let mut session = StreamSession::default();
        while let Some(event) = events.next().await {
            session.apply(event?, observer)?;
            if session.terminal_state() == TerminalState::Completed {
                debug!(
                    answer_len = session.accumulated_text().len(),
                    "stream completed"
                );
                return Ok(session.into_result());
            }
        }
        match self.end_of_stream {
            EndOfStreamPolicy::ImplicitSuccess => {
                debug!("stream ended without a terminal event, accepting accumulated text");
                Ok(session.into_result())
            }
            EndOfStreamPolicy::RequireTerminal => Err(ClientError::Protocol(
                "stream ended without stream_completed".into(),
            )),
        }
    }
}
