//! Merge-request summarization pipeline.
//!
//! Single high-level function to run one stateless pass over one MR diff:
//!
//! 1) **Step 1 — Filter setup**
//!    - Load the optional `diff_filter.json` allow/deny config
//!    - Compile glob matchers (malformed patterns abort before any API call)
//!
//! 2) **Step 2 — Diff acquisition + filtering**
//!    - `git diff <target>...<source>`, split per file, binary detection
//!    - Evaluate every path against the filter; build the audit report
//!
//! 3) **Step 3 — Chunking**
//!    - Elide pathologically large files to hunk headers
//!    - Greedy, line-safe packing under the chunk byte budget
//!
//! 4) **Step 4 — Summarization + aggregation**
//!    - Bounded-concurrency partial-summary calls with retry/backoff
//!    - Join on all chunk results, then one total-summary call
//!
//! The pipeline uses `tracing` for step logging and avoids `async-trait`
//! and heap trait objects; errors are unified by the crate-level type.

pub mod chunk;
pub mod context;
pub mod diff;
pub mod errors;
pub mod filter;
pub mod report;
pub mod summarize;

use std::time::Instant;
use tracing::debug;

use context::RunContext;
use diff::FileDiff;
use errors::{Error, RunResult};
use filter::{FilterConfig, FilterReport, PathFilter};
use summarize::client::SummarizationClient;
use summarize::{FinalSummary, PartialSummary};

/// Output of one pipeline run.
///
/// `summary` is `None` when there was nothing to summarize (empty diff or
/// every changed file filtered out) — the caller decides what, if anything,
/// to post in that case.
#[derive(Debug)]
pub struct RunOutput {
    pub summary: Option<FinalSummary>,
    pub filter_report: FilterReport,
    pub files_changed: usize,
    pub files_included: usize,
    pub chunk_count: usize,
}

/// Runs steps **1–4** for a single merge request.
///
/// This is the **single public entry** the CI binary calls. Fatal errors
/// (config, diff, exhausted summarization in fatal mode, all chunks failed,
/// deadline) abort the run; no partial summary is returned.
pub async fn run_summarization(ctx: &RunContext) -> RunResult<RunOutput> {
    // ---------------------------
    // Step 1: filter setup
    // ---------------------------
    let t0 = Instant::now();
    debug!("step1: load filter config");
    let filter_cfg = FilterConfig::load(&ctx.filter_config_path)?;
    let filter = PathFilter::new(&filter_cfg)?;
    debug!("step1: filter compiled ({} ms)", t0.elapsed().as_millis());

    // -----------------------------------
    // Step 2: diff acquisition + filtering
    // -----------------------------------
    let t1 = Instant::now();
    debug!(
        source = %ctx.source_branch,
        target = %ctx.target_branch,
        "step2: acquire diff"
    );
    let files = diff::acquire(
        &ctx.repo_dir,
        &ctx.source_branch,
        &ctx.target_branch,
        ctx.git_timeout,
    )
    .await?;

    let mut filter_report = FilterReport::default();
    let mut included: Vec<FileDiff> = Vec::new();
    for f in &files {
        let keep = filter.include_changed(Some(&f.old_path), &f.path);
        filter_report.record(&f.path, keep);
        if keep {
            included.push(f.clone());
        }
    }
    debug!(
        "step2: {} changed files, {} included ({} ms)",
        files.len(),
        included.len(),
        t1.elapsed().as_millis()
    );

    if included.is_empty() {
        debug!("step2: nothing to summarize after filtering");
        return Ok(RunOutput {
            summary: None,
            filter_report,
            files_changed: files.len(),
            files_included: 0,
            chunk_count: 0,
        });
    }

    // ---------------------------
    // Step 3: chunking
    // ---------------------------
    let t2 = Instant::now();
    for f in &mut included {
        if !f.is_binary && f.byte_len() > ctx.simplify_threshold_bytes {
            debug!(
                path = %f.path,
                bytes = f.byte_len(),
                lines = f.line_count(),
                "step3: eliding oversized file diff"
            );
            f.text = diff::simplify_oversized(&f.text);
        }
    }
    let chunks = chunk::chunk(&included, ctx.max_chunk_bytes)?;
    debug!(
        "step3: {} chunks under {} byte budget ({} ms)",
        chunks.len(),
        ctx.max_chunk_bytes,
        t2.elapsed().as_millis()
    );

    if chunks.is_empty() {
        // Every included file was binary or empty.
        return Ok(RunOutput {
            summary: None,
            filter_report,
            files_changed: files.len(),
            files_included: included.len(),
            chunk_count: 0,
        });
    }

    // -------------------------------------
    // Step 4: summarization + aggregation
    // -------------------------------------
    let t3 = Instant::now();
    let client = SummarizationClient::new(ctx)?;
    let summary = with_deadline(
        ctx.run_deadline,
        summarize_and_aggregate(&client, &chunks, ctx),
    )
    .await?;
    debug!(
        "step4: final summary ready, {} chars ({} ms)",
        summary.0.len(),
        t3.elapsed().as_millis()
    );

    Ok(RunOutput {
        summary: Some(summary),
        filter_report,
        files_changed: files.len(),
        files_included: included.len(),
        chunk_count: chunks.len(),
    })
}

/// Bounds a pipeline stage by the optional run deadline.
///
/// Expiry drops the in-flight future and surfaces [`Error::Aborted`]; the
/// caller gets no partial output.
async fn with_deadline<T>(
    deadline: Option<std::time::Duration>,
    fut: impl std::future::Future<Output = RunResult<T>>,
) -> RunResult<T> {
    match deadline {
        Some(d) => tokio::time::timeout(d, fut).await.map_err(|_| Error::Aborted)?,
        None => fut.await,
    }
}

/// Fan-out over chunks, then the single total-summary join.
async fn summarize_and_aggregate(
    client: &SummarizationClient,
    chunks: &[chunk::DiffChunk],
    ctx: &RunContext,
) -> RunResult<FinalSummary> {
    let partials: Vec<PartialSummary> =
        summarize::summarize_chunks(client, chunks, ctx.max_in_flight, ctx.failure_mode).await?;
    summarize::aggregate::aggregate(client, &partials).await
}

// -----------------------------------------------------------------------------
// Convenience re-exports for downstream users
// -----------------------------------------------------------------------------

pub use context::{FailureMode, RunContext as SummarizerRunContext};
pub use errors::{Error as SummarizerError, RunResult as SummarizerResult};
pub use filter::FilterReport as SummarizerFilterReport;
pub use summarize::FinalSummary as SummarizerFinalSummary;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chunk::{ChunkPart, DiffChunk};
    use errors::SummarizeError;
    use summarize::PartialSummary;

    #[tokio::test]
    async fn no_deadline_passes_results_through() {
        let out = with_deadline(None, async { Ok(FinalSummary("done".into())) })
            .await
            .unwrap();
        assert_eq!(out.0, "done");
    }

    #[tokio::test]
    async fn expired_deadline_aborts_with_no_output() {
        let stalled = futures::future::pending::<RunResult<FinalSummary>>();
        let err = with_deadline(Some(Duration::from_millis(20)), stalled)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Aborted));
    }

    #[tokio::test]
    async fn deadline_cuts_off_a_stalled_fanout() {
        let chunks = vec![DiffChunk {
            index: 0,
            parts: vec![ChunkPart {
                path: "a.rs".into(),
                text: "diff body\n".into(),
            }],
        }];
        // A call that never completes stands in for a hung API.
        let stage = async {
            let partials = summarize::summarize_chunks_with(
                |_c| futures::future::pending::<Result<PartialSummary, SummarizeError>>(),
                &chunks,
                2,
                FailureMode::Placeholder,
            )
            .await?;
            Ok(FinalSummary(partials[0].text.clone()))
        };
        let err = with_deadline(Some(Duration::from_millis(20)), stage)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Aborted));
    }
}
