//! Client library for a RAG query API (atomic and streamed answers).
//! Used by the `rag-query` binary.

pub mod config;
pub mod consumer;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod messages;
pub mod reveal;
pub mod session;

pub use config::{
    default_config_path, ConfigError, ConfigFile, EndOfStreamPolicy, QueryConfig, StreamLimits,
};
pub use consumer::{FnObserver, StreamConsumer, StreamObserver, StreamSession, TerminalState};
pub use decoder::{decode_stream, parse_line, EventDecoder, LineDecoder};
pub use dispatcher::QueryDispatcher;
pub use error::{ClientError, HINT};
pub use messages::{SearchRequest, SearchResult, SourceDocument, StreamEvent};
pub use reveal::{RevealFrame, Revealer};
pub use session::{QuerySession, ViewState};
