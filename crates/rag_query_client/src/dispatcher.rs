//! Query Dispatcher: picks the transport (atomic or streaming), issues the
//! POST and normalizes both paths into one [`SearchResult`].

use std::future::Future;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::Response;
use tracing::{debug, instrument};

use crate::config::QueryConfig;
use crate::consumer::{StreamConsumer, StreamObserver};
use crate::error::{ClientError, Result};
use crate::messages::{ErrorBody, SearchRequest, SearchResult};

pub const ATOMIC_PATH: &str = "/openai";
pub const STREAM_PATH: &str = "/openai/stream";

/// Issues queries against the RAG API.
#[derive(Debug, Clone, Default)]
pub struct QueryDispatcher {
    http: reqwest::Client,
}

impl QueryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots, ...).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Run one query.
    ///
    /// Returns `Ok(None)` without touching the network when `query` is empty
    /// or whitespace. Streaming progress goes to `observer`; the atomic path
    /// never calls it.
    #[instrument(skip_all, fields(streaming = config.use_streaming, api_url = %config.api_url))]
    pub async fn execute(
        &self,
        query: &str,
        config: &QueryConfig,
        observer: &mut dyn StreamObserver,
    ) -> Result<Option<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            debug!("ignoring empty query");
            return Ok(None);
        }
        config.validate()?;

        let request = SearchRequest {
            query: query.to_string(),
            limit: config.limit,
            temperature: config.temperature,
            max_output_tokens: config.max_tokens,
        };
        let result = if config.use_streaming {
            self.stream(&request, config, observer).await?
        } else {
            self.atomic(&request, config).await?
        };
        debug!(
            answer_len = result.answer.len(),
            sources = result.source_documents.len(),
            "query finished"
        );
        Ok(Some(result))
    }

    async fn atomic(&self, request: &SearchRequest, config: &QueryConfig) -> Result<SearchResult> {
        let url = config.endpoint(ATOMIC_PATH);
        within(config.limits.max_duration, async {
            let response = self.post(&url, request, "application/json").await?;
            let body = response.bytes().await?;
            serde_json::from_slice::<SearchResult>(&body)
                .map_err(|e| ClientError::Protocol(format!("malformed response body: {}", e)))
        })
        .await
    }

    async fn stream(
        &self,
        request: &SearchRequest,
        config: &QueryConfig,
        observer: &mut dyn StreamObserver,
    ) -> Result<SearchResult> {
        let url = config.endpoint(STREAM_PATH);
        // One budget for headers and body together; the consumer's own
        // deadline never fires first.
        within(config.limits.max_duration, async {
            let response = self.post(&url, request, "text/event-stream").await?;
            StreamConsumer::from_config(config)
                .consume(Box::pin(response.bytes_stream()), observer)
                .await
        })
        .await
    }

    async fn post(&self, url: &str, request: &SearchRequest, accept: &str) -> Result<Response> {
        debug!(url, "sending query");
        let response = self
            .http
            .post(url)
            .header(ACCEPT, accept)
            .json(request)
            .send()
            .await?;
        debug!(status = %response.status(), "response received");
        check_response(response).await
    }
}

/// Bound a whole call, from sending the request to its last byte.
async fn within<T>(max_duration: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(max_duration, call).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout(max_duration)),
    }
}

/// Map a non-2xx response to [`ClientError::Http`] with the best available detail.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    let detail = serde_json::from_slice::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.detail_text())
        .unwrap_or_else(|| {
            format!(
                "Erro {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )
            .trim_end()
            .to_string()
        });
    Err(ClientError::Http {
        status: status.as_u16(),
        detail,
    })
}
