//! Summarization API client with retry and backoff.
//!
//! Two logical operations share one code path: partial summaries (one per
//! chunk) and the final total summary. Each attempt authenticates from the
//! shared token cache, submits the text with a bounded timeout, and parses
//! the returned body. Retries follow an explicit state machine:
//! `Attempting → (Success | Transient → BackoffWait → Attempting |
//! Permanent)` with a bounded attempt counter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chunk::DiffChunk;
use crate::context::RunContext;
use crate::errors::{RunResult, SummarizeError, make_snippet};
use crate::summarize::auth::TokenCache;
use crate::summarize::{FinalSummary, PartialSummary};

/// Endpoint slug for per-chunk summaries.
pub const PARTIAL_SUMMARY_SLUG: &str = "partial-summary";
/// Endpoint slug for the aggregated total summary.
pub const TOTAL_SUMMARY_SLUG: &str = "total-summary";

/// Backoff knobs for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay for the given 1-based attempt, capped at
    /// `max_delay`, plus up to 50% random jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let exp = self.base_delay.saturating_mul(1u32 << shift);
        let capped = exp.min(self.max_delay);
        let half_ms = capped.as_millis() as u64 / 2;
        let jitter_ms = if half_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=half_ms)
        };
        capped + Duration::from_millis(jitter_ms)
    }
}

/// What the retry state machine decides after a failed attempt.
#[derive(Debug)]
pub enum RetryOutcome {
    /// Sleep for the given backoff, then attempt again.
    RetryAfter(Duration),
    /// Terminal: surface the error (permanent, or attempts exhausted).
    GiveUp,
}

/// Bounded retry state. `begin` opens an attempt; `on_failure` transitions
/// to either a backoff wait or the terminal state.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn begin(&mut self) {
        self.attempt += 1;
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempt
    }

    pub fn on_failure(&mut self, err: &SummarizeError) -> RetryOutcome {
        if !err.is_transient() {
            return RetryOutcome::GiveUp;
        }
        if self.attempt >= self.policy.max_attempts {
            return RetryOutcome::GiveUp;
        }
        RetryOutcome::RetryAfter(self.policy.delay_for(self.attempt))
    }
}

#[derive(Debug, Serialize)]
struct SummaryRequest<'a> {
    input_data: &'a str,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    result: String,
}

/// Authenticated client for the summarization API.
#[derive(Debug)]
pub struct SummarizationClient {
    http: reqwest::Client,
    api_base: String,
    auth_base: String,
    creds: crate::context::Credentials,
    token: TokenCache,
    retry: RetryPolicy,
}

impl SummarizationClient {
    /// Builds the client from the run context (timeout, endpoints,
    /// credentials, retry policy).
    pub fn new(ctx: &RunContext) -> RunResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(ctx.request_timeout)
            .build()
            .map_err(SummarizeError::from)?;
        Ok(Self {
            http,
            api_base: ctx.summary_api_base_url.trim_end_matches('/').to_string(),
            auth_base: ctx.auth_base_url.clone(),
            creds: ctx.credentials.clone(),
            token: TokenCache::new(),
            retry: RetryPolicy {
                max_attempts: ctx.max_attempts.max(1),
                ..RetryPolicy::default()
            },
        })
    }

    /// Summarizes one chunk into a path-attributed partial summary.
    pub async fn summarize(&self, chunk: &DiffChunk) -> Result<PartialSummary, SummarizeError> {
        let input = chunk.combined_text();
        debug!(
            chunk = chunk.index,
            bytes = input.len(),
            files = chunk.paths().len(),
            "requesting partial summary"
        );
        let text = self.execute(PARTIAL_SUMMARY_SLUG, &input).await?;
        Ok(PartialSummary {
            index: chunk.index,
            paths: chunk.paths(),
            text: strip_code_fences(&text),
            placeholder: false,
        })
    }

    /// Issues the total-summary call over the prebuilt aggregated input.
    pub async fn summarize_total(&self, input: &str) -> Result<FinalSummary, SummarizeError> {
        debug!(bytes = input.len(), "requesting total summary");
        let text = self.execute(TOTAL_SUMMARY_SLUG, input).await?;
        Ok(FinalSummary(strip_code_fences(&text)))
    }

    /// Runs one logical call through the retry state machine.
    async fn execute(&self, slug: &str, input: &str) -> Result<String, SummarizeError> {
        let mut state = RetryState::new(self.retry.clone());
        loop {
            state.begin();
            match self.attempt(slug, input).await {
                Ok(text) => {
                    debug!(slug, attempt = state.attempts_made(), "summarization call ok");
                    return Ok(text);
                }
                Err(e) => match state.on_failure(&e) {
                    RetryOutcome::RetryAfter(delay) => {
                        warn!(
                            slug,
                            attempt = state.attempts_made(),
                            backoff_ms = delay.as_millis() as u64,
                            error = %e,
                            "transient summarization failure; backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryOutcome::GiveUp => {
                        warn!(
                            slug,
                            attempts = state.attempts_made(),
                            error = %e,
                            "summarization call gave up"
                        );
                        return Err(e);
                    }
                },
            }
        }
    }

    /// One authenticated POST. A 401 invalidates the cached token and is
    /// reported transient so the retry path re-authenticates.
    async fn attempt(&self, slug: &str, input: &str) -> Result<String, SummarizeError> {
        let bearer = self
            .token
            .bearer(&self.http, &self.auth_base, &self.creds)
            .await?;

        let url = format!("{}/summaries/{}", self.api_base, slug);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&bearer)
            .json(&SummaryRequest { input_data: input })
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 401 {
            self.token.invalidate().await;
            return Err(SummarizeError::Transient {
                status: Some(401),
                reason: "bearer token rejected".into(),
            });
        }
        if !status.is_success() {
            let snippet = make_snippet(&resp.text().await.unwrap_or_default());
            return Err(SummarizeError::from_status(
                status.as_u16(),
                format!("{slug}: {snippet}"),
            ));
        }

        let body: SummaryResponse = resp.json().await.map_err(|e| SummarizeError::Permanent {
            status: None,
            reason: format!("malformed summary response: {e}"),
        })?;
        Ok(body.result)
    }
}

/// Strips a wrapping Markdown code fence some models add around output.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = text.trim();
    if out.starts_with("```") {
        out = match out.find('\n') {
            Some(idx) => &out[idx + 1..],
            None => "",
        };
    }
    if let Some(stripped) = out.strip_suffix("```") {
        out = stripped;
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> SummarizeError {
        SummarizeError::Transient {
            status: Some(503),
            reason: "server error".into(),
        }
    }

    fn permanent() -> SummarizeError {
        SummarizeError::Permanent {
            status: Some(400),
            reason: "bad request".into(),
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        }
    }

    #[test]
    fn permanent_failure_triggers_zero_retries() {
        let mut state = RetryState::new(policy(5));
        state.begin();
        assert!(matches!(state.on_failure(&permanent()), RetryOutcome::GiveUp));
        assert_eq!(state.attempts_made(), 1);
    }

    #[test]
    fn transient_failures_never_exceed_max_attempts() {
        let max = 3;
        let mut state = RetryState::new(policy(max));
        let mut attempts = 0;
        loop {
            state.begin();
            attempts += 1;
            match state.on_failure(&transient()) {
                RetryOutcome::RetryAfter(_) => continue,
                RetryOutcome::GiveUp => break,
            }
        }
        assert_eq!(attempts, max);
        assert_eq!(state.attempts_made(), max);
    }

    #[test]
    fn backoff_grows_and_stays_capped() {
        let p = policy(10);
        let d1 = p.delay_for(1);
        assert!(d1 >= Duration::from_millis(10));
        // Cap plus at most 50% jitter.
        for attempt in 1..=10 {
            assert!(p.delay_for(attempt) <= Duration::from_millis(150));
        }
    }

    #[test]
    fn strips_fenced_output() {
        assert_eq!(strip_code_fences("```markdown\nhello\n```"), "hello");
        assert_eq!(strip_code_fences("```\nhi\n```"), "hi");
        assert_eq!(strip_code_fences("plain text"), "plain text");
        assert_eq!(strip_code_fences("  padded  "), "padded");
    }
}
