//! Wire types for the RAG API. Client → server request, server → client results and stream events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Client → server: body of both `/openai` and `/openai/stream`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: u32,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

/// A retrieved passage the backend used to ground its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub page_content: String,
    /// Key order follows the server's JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl SourceDocument {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: None,
        }
    }
}

/// Answer plus sources; the common output of the atomic and streaming paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub answer: String,
    #[serde(default)]
    pub source_documents: Vec<SourceDocument>,
}

/// Server → client: body of a non-2xx response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    /// The `detail` field as display text, when present and non-empty.
    pub fn detail_text(&self) -> Option<String> {
        self.detail.as_ref().and_then(non_empty_text)
    }
}

/// Server → client: documents sent ahead of the text.
#[derive(Debug, Clone, Deserialize)]
struct SourceDocumentsMessage {
    documents: Vec<SourceDocument>,
}

/// Server → client: one text fragment. `output_index`/`content_index` are ignored.
#[derive(Debug, Clone, Deserialize)]
struct TextDeltaMessage {
    delta: String,
}

/// Server → client: `error` or `response.failed`.
#[derive(Debug, Clone, Default, Deserialize)]
struct FailureMessage {
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

const FALLBACK_FAILURE: &str = "stream failed";

/// One event from the streaming endpoint; discriminator is the JSON "type" field.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    SourceDocuments(Vec<SourceDocument>),
    TextDelta(String),
    ResponseCreated,
    StreamCompleted,
    /// `error` or `response.failed`, carrying the message to surface.
    Failed(String),
    /// Any tag this client does not act on.
    Other(String),
}

impl StreamEvent {
    pub fn from_json(value: &Value) -> Result<Self, String> {
        let typ = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or("missing type")?;
        match typ {
            "source_documents" => {
                let m: SourceDocumentsMessage =
                    serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
                Ok(StreamEvent::SourceDocuments(m.documents))
            }
            "text_delta" => {
                let m: TextDeltaMessage =
                    serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
                Ok(StreamEvent::TextDelta(m.delta))
            }
            "response.created" => Ok(StreamEvent::ResponseCreated),
            "stream_completed" => Ok(StreamEvent::StreamCompleted),
            "error" | "response.failed" => {
                let m: FailureMessage =
                    serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
                let message = m
                    .message
                    .as_ref()
                    .and_then(non_empty_text)
                    .or_else(|| m.error.as_ref().and_then(non_empty_text))
                    .unwrap_or_else(|| FALLBACK_FAILURE.to_string());
                Ok(StreamEvent::Failed(message))
            }
            other => Ok(StreamEvent::Other(other.to_string())),
        }
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        Self::from_json(&value)
    }

    /// True for events that end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::StreamCompleted | StreamEvent::Failed(_))
    }
}

fn non_empty_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(non_empty_text)
            .or_else(|| Some(value.to_string())),
        other => Some(other.to_string()),
    }
}
