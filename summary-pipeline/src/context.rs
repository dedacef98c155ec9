//! Explicit run context for one pipeline invocation.
//!
//! Everything the original CI scripts read from ambient globals (env vars,
//! cached tokens, magic constants) lives here and is passed into each
//! component. Credentials are held once per run; the token cache that
//! derives from them is owned by the summarization client.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ConfigError, RunResult};

/// Per-chunk failure policy for the summarization stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// One failed chunk fails the whole run.
    Fatal,
    /// A failed chunk degrades to a clearly marked placeholder partial
    /// summary so the remaining chunks still get summarized.
    Placeholder,
}

/// Client-credential material for the summarization API token exchange.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub realm: String,
}

/// All inputs for a single stateless run.
///
/// Provider identifiers (`project_id`, `mr_iid`, `api_base_url`) are carried
/// read-only for the external comment poster; the core never interprets them.
#[derive(Debug, Clone)]
pub struct RunContext {
    // CI-provided identifiers (read-only pass-through).
    pub project_id: String,
    pub mr_iid: String,
    pub api_base_url: String,
    pub source_branch: String,
    pub target_branch: String,

    /// Checked-out repository the diff is computed in.
    pub repo_dir: PathBuf,

    // Summarization API.
    pub auth_base_url: String,
    pub summary_api_base_url: String,
    pub credentials: Credentials,

    // Budgets and policies.
    pub max_chunk_bytes: usize,
    /// Files whose diff exceeds this are elided to hunk headers before
    /// chunking; well above `max_chunk_bytes` so normal oversized files
    /// still get split into real sub-chunks.
    pub simplify_threshold_bytes: usize,
    pub max_attempts: u32,
    pub max_in_flight: usize,
    pub request_timeout: Duration,
    pub git_timeout: Duration,
    pub failure_mode: FailureMode,
    /// Overall deadline for the summarization stage; `None` = unbounded.
    pub run_deadline: Option<Duration>,

    // Artifact locations.
    pub filter_config_path: PathBuf,
    pub filter_report_path: PathBuf,
    pub summary_comment_path: PathBuf,
    pub duplication_report_path: PathBuf,
    pub duplication_comment_path: PathBuf,
}

impl RunContext {
    /// Builds the context from CI environment variables.
    ///
    /// Identifiers follow the GitLab CI names; tunables use `SUMMARY_*`
    /// with sensible defaults so only the credentials are mandatory.
    pub fn from_env() -> RunResult<Self> {
        let credentials = Credentials {
            client_id: must_env("SUMMARY_CLIENT_ID")?,
            client_secret: must_env("SUMMARY_CLIENT_SECRET")?,
            realm: must_env("SUMMARY_CLIENT_REALM")?,
        };

        let failure_mode = match env_or("SUMMARY_CHUNK_FAILURE", "placeholder").as_str() {
            "fatal" => FailureMode::Fatal,
            _ => FailureMode::Placeholder,
        };

        let run_deadline = env_parse_opt::<u64>("SUMMARY_RUN_DEADLINE_SECS")?
            .map(Duration::from_secs);

        Ok(Self {
            project_id: must_env("CI_PROJECT_ID")?,
            mr_iid: must_env("CI_MERGE_REQUEST_IID")?,
            api_base_url: must_env("CI_API_V4_URL")?,
            source_branch: must_env("CI_MERGE_REQUEST_SOURCE_BRANCH_NAME")?,
            target_branch: env_or("CI_MERGE_REQUEST_TARGET_BRANCH_NAME", "main"),
            repo_dir: PathBuf::from(env_or("SUMMARY_REPO_DIR", ".")),
            auth_base_url: must_env("SUMMARY_AUTH_BASE_URL")?,
            summary_api_base_url: must_env("SUMMARY_API_BASE_URL")?,
            credentials,
            max_chunk_bytes: env_parse_or("SUMMARY_MAX_CHUNK_BYTES", 50_000usize)?,
            simplify_threshold_bytes: env_parse_or(
                "SUMMARY_SIMPLIFY_THRESHOLD_BYTES",
                500_000usize,
            )?,
            max_attempts: env_parse_or("SUMMARY_MAX_ATTEMPTS", 4u32)?,
            max_in_flight: env_parse_or("SUMMARY_MAX_IN_FLIGHT", 4usize)?,
            request_timeout: Duration::from_secs(env_parse_or(
                "SUMMARY_REQUEST_TIMEOUT_SECS",
                60u64,
            )?),
            git_timeout: Duration::from_secs(env_parse_or("SUMMARY_GIT_TIMEOUT_SECS", 60u64)?),
            failure_mode,
            run_deadline,
            filter_config_path: PathBuf::from(env_or("SUMMARY_FILTER_CONFIG", "diff_filter.json")),
            filter_report_path: PathBuf::from(env_or(
                "SUMMARY_FILTER_REPORT",
                "filter-report.json",
            )),
            summary_comment_path: PathBuf::from(env_or(
                "SUMMARY_COMMENT_PATH",
                "summary-comment.md",
            )),
            duplication_report_path: PathBuf::from(env_or(
                "SUMMARY_DUPLICATION_REPORT",
                "jscpd-report/jscpd-report.json",
            )),
            duplication_comment_path: PathBuf::from(env_or(
                "SUMMARY_DUPLICATION_COMMENT",
                "duplication-comment.md",
            )),
        })
    }
}

/// Fetches a required, non-empty environment variable.
fn must_env(name: &'static str) -> RunResult<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name).into()),
    }
}

/// Environment variable with a default for unset/empty values.
fn env_or(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

/// Parses a numeric knob, falling back to `default` when unset.
fn env_parse_or<T: FromStr>(name: &'static str, default: T) -> RunResult<T> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidNumber {
                var: name,
                reason: "expected a positive number",
            }
            .into()
        }),
        _ => Ok(default),
    }
}

/// Parses an optional numeric knob (`Ok(None)` if unset/empty).
fn env_parse_opt<T: FromStr>(name: &'static str) -> RunResult<Option<T>> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigError::InvalidNumber {
                var: name,
                reason: "expected a positive number",
            }
            .into()
        }),
        _ => Ok(None),
    }
}
