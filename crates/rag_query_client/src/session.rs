//! Query session: the observable view state around the dispatcher.
//!
//! Only one query is live at a time. Submitting a new query aborts the
//! previous task, and every view update is tagged with a generation so a
//! superseded task can never write to the view.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use crate::config::QueryConfig;
use crate::consumer::StreamObserver;
use crate::dispatcher::QueryDispatcher;
use crate::messages::{SearchResult, SourceDocument};

/// What a UI renders. Replaced wholesale at the start of each query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    /// Identity of the query this state belongs to.
    pub generation: u64,
    pub in_flight: bool,
    /// Text streamed so far. Cleared on failure.
    pub streaming_text: String,
    /// Documents received on the stream so far. Cleared on failure.
    pub source_documents: Vec<SourceDocument>,
    pub result: Option<SearchResult>,
    /// User-facing error message of a failed query.
    pub error: Option<String>,
}

pub struct QuerySession {
    dispatcher: QueryDispatcher,
    config: QueryConfig,
    view: Arc<watch::Sender<ViewState>>,
    current: Option<AbortHandle>,
    generation: u64,
}

impl QuerySession {
    pub fn new(dispatcher: QueryDispatcher, config: QueryConfig) -> Self {
        let (view, _) = watch::channel(ViewState::default());
        Self {
            dispatcher,
            config,
            view: Arc::new(view),
            current: None,
            generation: 0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view.subscribe()
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Replace the configuration used by later queries.
    pub fn set_config(&mut self, config: QueryConfig) {
        self.config = config;
    }

    /// Restore the build-time defaults.
    pub fn reset_config(&mut self) {
        self.config = QueryConfig::default();
    }

    /// Start a query, superseding any query still in flight.
    ///
    /// Whitespace-only input is ignored: no task, no view change. Must be
    /// called from within a tokio runtime.
    pub fn submit(&mut self, query: &str) -> Option<JoinHandle<()>> {
        if query.trim().is_empty() {
            return None;
        }
        if let Some(previous) = self.current.take() {
            debug!(generation = self.generation, "superseding in-flight query");
            previous.abort();
        }
        self.generation += 1;
        let generation = self.generation;
        self.view.send_replace(ViewState {
            generation,
            in_flight: true,
            ..ViewState::default()
        });

        let task = tokio::spawn(run_query(
            self.dispatcher.clone(),
            self.config.clone(),
            query.to_string(),
            generation,
            self.view.clone(),
        ));
        self.current = Some(task.abort_handle());
        Some(task)
    }

    /// Abort the in-flight query, if any. The view keeps what it had and
    /// stops being in flight.
    pub fn cancel(&mut self) {
        if let Some(current) = self.current.take() {
            current.abort();
            let generation = self.generation;
            self.view.send_if_modified(|view| {
                if view.generation != generation || !view.in_flight {
                    return false;
                }
                view.in_flight = false;
                true
            });
        }
    }
}

impl Drop for QuerySession {
    fn drop(&mut self) {
        if let Some(current) = self.current.take() {
            current.abort();
        }
    }
}

/// Streams progress into the view while the generation is current.
struct ViewObserver {
    generation: u64,
    view: Arc<watch::Sender<ViewState>>,
}

impl StreamObserver for ViewObserver {
    fn on_text(&mut self, accumulated: &str) {
        let generation = self.generation;
        self.view.send_if_modified(|view| {
            if view.generation != generation {
                return false;
            }
            view.streaming_text.clear();
            view.streaming_text.push_str(accumulated);
            true
        });
    }

    fn on_documents(&mut self, documents: &[SourceDocument]) {
        let generation = self.generation;
        self.view.send_if_modified(|view| {
            if view.generation != generation {
                return false;
            }
            view.source_documents = documents.to_vec();
            true
        });
    }
}

async fn run_query(
    dispatcher: QueryDispatcher,
    config: QueryConfig,
    query: String,
    generation: u64,
    view: Arc<watch::Sender<ViewState>>,
) {
    let mut observer = ViewObserver {
        generation,
        view: view.clone(),
    };
    let outcome = dispatcher.execute(&query, &config, &mut observer).await;

    view.send_if_modified(move |state| {
        if state.generation != generation {
            return false;
        }
        match outcome {
            Ok(result) => {
                state.result = result;
                state.error = None;
            }
            Err(e) => {
                warn!(generation, error = %e, "query failed");
                state.result = None;
                state.streaming_text.clear();
                state.source_documents.clear();
                state.error = Some(e.user_message());
            }
        }
        state.in_flight = false;
        true
    });
}
