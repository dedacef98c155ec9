//! Crate-wide error hierarchy for the summarization pipeline.
//!
//! Goals:
//! - Single root `Error` for all public functions.
//! - Status-aware mapping for the summarization API (429/5xx/timeout are
//!   transient, other 4xx and malformed bodies are permanent).
//! - No dynamic dispatch, ergonomic `?` via `From` impls.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type RunResult<T> = Result<T, Error>;

/// Root error type for one pipeline run.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration problems (bad patterns, missing env vars, zero budgets).
    /// Always fatal before any API call is made.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Diff acquisition failure (unresolvable refs, git unavailable).
    #[error(transparent)]
    Diff(#[from] DiffError),

    /// Summarization API failure that escaped the retry policy.
    #[error(transparent)]
    Summarize(#[from] SummarizeError),

    /// Report artifact I/O or serialization failure.
    #[error(transparent)]
    Report(#[from] ReportError),

    /// Every chunk exhausted its retries; the total-summary call is skipped.
    #[error("all chunks failed to summarize; total summary skipped")]
    AllChunksFailed,

    /// The run deadline expired; in-flight calls were dropped and no
    /// partial output is produced.
    #[error("run aborted: pipeline deadline exceeded")]
    Aborted,
}

/// Configuration and setup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A numeric knob failed to parse.
    #[error("invalid number in {var}: {reason}")]
    InvalidNumber {
        var: &'static str,
        reason: &'static str,
    },

    /// A glob in the filter config does not compile. The run aborts
    /// rather than silently mis-filtering.
    #[error("invalid filter pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Filter config file exists but cannot be read or parsed.
    #[error("unusable filter config {path}: {reason}")]
    FilterConfig { path: String, reason: String },

    /// Chunk budget must be positive.
    #[error("chunk budget must be greater than zero")]
    ZeroChunkBudget,
}

/// Diff acquisition errors. Fatal for the run; no partial diff is produced.
#[derive(Debug, Error)]
pub enum DiffError {
    /// Refs could not be resolved or git itself failed.
    #[error("diff unavailable: {0}")]
    Unavailable(String),

    /// The git invocation exceeded its timeout.
    #[error("git diff timed out")]
    Timeout,
}

/// Summarization API errors, split by retryability.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// Timeout, 5xx, rate-limit or network failure. Retried with backoff.
    #[error("transient summarization failure: {reason}")]
    Transient { status: Option<u16>, reason: String },

    /// Bad request or malformed response. Never retried.
    #[error("permanent summarization failure: {reason}")]
    Permanent { status: Option<u16>, reason: String },
}

impl SummarizeError {
    /// Whether the retry policy may re-attempt after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, SummarizeError::Transient { .. })
    }

    /// Classify a non-success HTTP status from the summarization API.
    ///
    /// 429 and 5xx are transient; every other status is permanent.
    /// 401 is special-cased at the call site where a token refresh applies.
    pub fn from_status(status: u16, reason: String) -> Self {
        match status {
            429 | 500..=599 => SummarizeError::Transient {
                status: Some(status),
                reason,
            },
            _ => SummarizeError::Permanent {
                status: Some(status),
                reason,
            },
        }
    }
}

/// Report artifact errors (file I/O and JSON).
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

// ===== Conversions for `?` ergonomics =====

impl From<reqwest::Error> for SummarizeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return SummarizeError::Transient {
                status: None,
                reason: "request timed out".into(),
            };
        }
        if let Some(status) = e.status() {
            return SummarizeError::from_status(status.as_u16(), e.to_string());
        }
        SummarizeError::Transient {
            status: None,
            reason: format!("network error: {e}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Report(ReportError::Io(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Report(ReportError::Serde(e))
    }
}

/// Short single-line snippet of a response body for logs and errors.
///
/// Bounded in bytes, backing off to the nearest char boundary so multibyte
/// bodies never split a character.
pub fn make_snippet(text: &str) -> String {
    const MAX_BYTES: usize = 200;
    let mut end = text.len().min(MAX_BYTES);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].replace('\n', " ").trim().to_string()
}
