//! Error taxonomy shared by the dispatcher, the stream consumer and the session.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Generic hint shown after any terminal query error.
pub const HINT: &str = "Hint: check that the RAG API is running and that the API URL is configured correctly.";

/// Terminal failure of one query. None of these are retried.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never reached the server or the response could not be read.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {detail}")]
    Http {
        /// Response status code.
        status: u16,
        /// `detail` from the error body, or `Erro {status}: {reason}`.
        detail: String,
    },

    /// The upstream signaled an error event, or a required body was malformed or empty.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The streaming session exceeded its maximum duration.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// A newer query superseded this one.
    #[error("query superseded by a newer one")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Single human-readable message for display to the user.
    ///
    /// HTTP failures show the server's detail verbatim; everything else uses
    /// the `Display` form.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Http { detail, .. } => detail.clone(),
            ClientError::Protocol(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Network(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
