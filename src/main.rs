//! CI entrypoint: one summarization pass over the current merge request.
//!
//! Reads everything from the environment, runs the pipeline, and writes the
//! comment body and report artifacts for the comment-posting job. Exits
//! non-zero on fatal errors so the pipeline marks the job failed and no
//! comment is posted.

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use summary_pipeline::context::RunContext;
use summary_pipeline::report;

const NO_CHANGES_COMMENT: &str =
    "📝 **AI Summary**\n\nNo changes matched the summary filter for this merge request.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is a local convenience; CI injects variables directly.
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default tracing subscriber")?;

    let ctx = RunContext::from_env()?;
    info!(
        project = %ctx.project_id,
        mr = %ctx.mr_iid,
        source = %ctx.source_branch,
        target = %ctx.target_branch,
        "starting merge-request summarization"
    );

    let out = summary_pipeline::run_summarization(&ctx).await?;

    report::write_filter_report(&out.filter_report, &ctx.filter_report_path)?;

    let comment = match &out.summary {
        Some(summary) => summary.0.clone(),
        None => {
            warn!("no summarizable changes; writing fallback comment");
            NO_CHANGES_COMMENT.to_string()
        }
    };
    std::fs::write(&ctx.summary_comment_path, &comment).with_context(|| {
        format!(
            "writing summary comment to {}",
            ctx.summary_comment_path.display()
        )
    })?;

    if ctx.duplication_report_path.exists() {
        let dup = report::DuplicationReport::load(&ctx.duplication_report_path)?;
        let body = report::render_duplication_comment(&dup, &out.filter_report);
        std::fs::write(&ctx.duplication_comment_path, body).with_context(|| {
            format!(
                "writing duplication comment to {}",
                ctx.duplication_comment_path.display()
            )
        })?;
    }

    info!(
        files_changed = out.files_changed,
        files_included = out.files_included,
        chunks = out.chunk_count,
        comment_bytes = comment.len(),
        "summarization run complete"
    );
    Ok(())
}
