//! Query configuration: build-time defaults, an optional read-only YAML overlay
//! (`~/.rag-query/config.yaml`), and range validation.
//!
//! Configuration is session-scoped. Nothing here ever writes a file.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_LIMIT: u32 = 5;
pub const DEFAULT_TEMPERATURE: f64 = 0.5;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

pub const LIMIT_RANGE: RangeInclusive<u32> = 1..=20;
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 0.0..=2.0;
pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 100..=8192;

/// What to do when the byte stream ends before `stream_completed` or `error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EndOfStreamPolicy {
    /// Return whatever text and documents were accumulated.
    #[default]
    ImplicitSuccess,
    /// Fail with a protocol error.
    RequireTerminal,
}

/// Bounds on one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    /// Longest accepted line (one event), in bytes.
    pub max_line_bytes: usize,
    /// Wall-clock budget for the whole session.
    pub max_duration: Duration,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 1024 * 1024,
            max_duration: Duration::from_secs(300),
        }
    }
}

/// Effective configuration for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    pub api_url: String,
    pub limit: u32,
    pub temperature: f64,
    pub max_tokens: u32,
    pub use_streaming: bool,
    pub end_of_stream: EndOfStreamPolicy,
    pub limits: StreamLimits,
}

impl Default for QueryConfig {
    /// Defaults baked in at build time from `RAG_API_URL`, `RAG_DEFAULT_LIMIT`,
    /// `RAG_DEFAULT_TEMPERATURE` and `RAG_DEFAULT_MAX_TOKENS`.
    fn default() -> Self {
        Self {
            api_url: build_env(option_env!("RAG_API_URL"), DEFAULT_API_URL.to_string()),
            limit: build_env(option_env!("RAG_DEFAULT_LIMIT"), DEFAULT_LIMIT),
            temperature: build_env(option_env!("RAG_DEFAULT_TEMPERATURE"), DEFAULT_TEMPERATURE),
            max_tokens: build_env(option_env!("RAG_DEFAULT_MAX_TOKENS"), DEFAULT_MAX_TOKENS),
            use_streaming: true,
            end_of_stream: EndOfStreamPolicy::default(),
            limits: StreamLimits::default(),
        }
    }
}

fn build_env<T: FromStr>(value: Option<&'static str>, fallback: T) -> T {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

impl QueryConfig {
    /// Check every field against its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.api_url)
            .map_err(|e| ConfigError::Invalid(format!("api_url {:?}: {}", self.api_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "api_url must use http or https, got {:?}",
                url.scheme()
            )));
        }
        if !LIMIT_RANGE.contains(&self.limit) {
            return Err(ConfigError::Invalid(format!(
                "limit must be between {} and {}, got {}",
                LIMIT_RANGE.start(),
                LIMIT_RANGE.end(),
                self.limit
            )));
        }
        if !TEMPERATURE_RANGE.contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be between {} and {}, got {}",
                TEMPERATURE_RANGE.start(),
                TEMPERATURE_RANGE.end(),
                self.temperature
            )));
        }
        if !MAX_TOKENS_RANGE.contains(&self.max_tokens) {
            return Err(ConfigError::Invalid(format!(
                "max_tokens must be between {} and {}, got {}",
                MAX_TOKENS_RANGE.start(),
                MAX_TOKENS_RANGE.end(),
                self.max_tokens
            )));
        }
        if self.limits.max_line_bytes == 0 || self.limits.max_duration.is_zero() {
            return Err(ConfigError::Invalid("stream limits must be non-zero".into()));
        }
        Ok(())
    }

    /// `{api_url}{path}` with any trailing slash on the base removed.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }

    /// Override fields present in `file`.
    pub fn apply(&mut self, file: &ConfigFile) {
        if let Some(url) = &file.api.url {
            self.api_url = url.clone();
        }
        if let Some(limit) = file.query.limit {
            self.limit = limit;
        }
        if let Some(temperature) = file.query.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = file.query.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(streaming) = file.query.streaming {
            self.use_streaming = streaming;
        }
        if let Some(require) = file.stream.require_terminal_event {
            self.end_of_stream = if require {
                EndOfStreamPolicy::RequireTerminal
            } else {
                EndOfStreamPolicy::ImplicitSuccess
            };
        }
        if let Some(bytes) = file.stream.max_event_bytes {
            self.limits.max_line_bytes = bytes;
        }
        if let Some(secs) = file.stream.max_duration_secs {
            self.limits.max_duration = Duration::from_secs(secs);
        }
    }
}

/// API section (url).
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ApiSection {
    pub url: Option<String>,
}

/// Query section (limit, temperature, max_tokens, streaming).
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct QuerySection {
    pub limit: Option<u32>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub streaming: Option<bool>,
}

/// Stream section (require_terminal_event, max_event_bytes, max_duration_secs).
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct StreamSection {
    pub require_terminal_event: Option<bool>,
    pub max_event_bytes: Option<usize>,
    pub max_duration_secs: Option<u64>,
}

/// On-disk overlay. Every field is optional; absent fields keep their defaults.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub query: QuerySection,
    #[serde(default)]
    pub stream: StreamSection,
}

/// Returns the default config file path: `~/.rag-query/config.yaml` (platform-specific).
pub fn default_config_path() -> Option<PathBuf> {
    let home = home_dir()?;
    Some(home.join(".rag-query").join("config.yaml"))
}

#[cfg(unix)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(any(unix, windows)))]
fn home_dir() -> Option<PathBuf> {
    None
}

/// Load an overlay from a YAML file.
pub fn load(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
    serde_yaml::from_str(&contents)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
}

/// Config load or validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
