//! Chunk summarization fan-out and aggregation.
//!
//! Each chunk is summarized independently, so calls run concurrently under
//! a bounded in-flight cap. The aggregator is the join point: it waits for
//! every chunk result (success or placeholder) before the single
//! total-summary call.

pub mod aggregate;
pub mod auth;
pub mod client;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::chunk::DiffChunk;
use crate::context::FailureMode;
use crate::errors::{RunResult, SummarizeError};
use client::SummarizationClient;

/// Text result of summarizing one chunk, tagged for ordered reassembly.
#[derive(Debug, Clone)]
pub struct PartialSummary {
    pub index: usize,
    /// Owning file paths, preserved for file-attributed aggregation.
    pub paths: Vec<String>,
    pub text: String,
    /// True when this partial stands in for a failed chunk.
    pub placeholder: bool,
}

impl PartialSummary {
    /// Clearly marked stand-in for a chunk whose retries were exhausted.
    pub fn placeholder(index: usize, paths: Vec<String>, err: &SummarizeError) -> Self {
        let text = format!("(summary unavailable for {}: {})", paths.join(", "), err);
        Self {
            index,
            paths,
            text,
            placeholder: true,
        }
    }
}

/// Terminal artifact of one run: the aggregated summary text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalSummary(pub String);

/// Summarizes all chunks with at most `max_in_flight` concurrent calls.
///
/// Results come back in chunk order regardless of completion order. In
/// `Placeholder` mode a failed chunk degrades to a marked placeholder so
/// one bad chunk does not block the others; in `Fatal` mode the first
/// failure fails the run.
pub async fn summarize_chunks(
    client: &SummarizationClient,
    chunks: &[DiffChunk],
    max_in_flight: usize,
    mode: FailureMode,
) -> RunResult<Vec<PartialSummary>> {
    summarize_chunks_with(|chunk| client.summarize(chunk), chunks, max_in_flight, mode).await
}

/// Fan-out core, generic over the per-chunk call so the failure-mode
/// branches are drivable without a live API.
pub(crate) async fn summarize_chunks_with<'a, F, Fut>(
    summarize_one: F,
    chunks: &'a [DiffChunk],
    max_in_flight: usize,
    mode: FailureMode,
) -> RunResult<Vec<PartialSummary>>
where
    F: Fn(&'a DiffChunk) -> Fut,
    Fut: std::future::Future<Output = Result<PartialSummary, SummarizeError>>,
{
    debug!(
        chunks = chunks.len(),
        max_in_flight,
        ?mode,
        "summarizing chunks"
    );

    let mut results: Vec<(usize, Result<PartialSummary, SummarizeError>)> =
        futures::stream::iter(chunks.iter().map(|chunk| {
            let call = summarize_one(chunk);
            async move { (chunk.index, call.await) }
        }))
        .buffer_unordered(max_in_flight.max(1))
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);

    let mut partials = Vec::with_capacity(results.len());
    for (index, result) in results {
        match result {
            Ok(partial) => partials.push(partial),
            Err(e) => match mode {
                FailureMode::Fatal => return Err(e.into()),
                FailureMode::Placeholder => {
                    warn!(chunk = index, error = %e, "chunk failed; substituting placeholder");
                    partials.push(PartialSummary::placeholder(index, chunks[index].paths(), &e));
                }
            },
        }
    }
    Ok(partials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkPart;
    use crate::errors::Error;

    fn chunk(index: usize, path: &str) -> DiffChunk {
        DiffChunk {
            index,
            parts: vec![ChunkPart {
                path: path.to_string(),
                text: format!("diff body for {path}\n"),
            }],
        }
    }

    fn transient() -> SummarizeError {
        SummarizeError::Transient {
            status: Some(503),
            reason: "server error".into(),
        }
    }

    /// Fake per-chunk call failing exactly the chunk at `bad_index`.
    fn failing_at(
        bad_index: usize,
    ) -> impl Fn(&DiffChunk) -> std::future::Ready<Result<PartialSummary, SummarizeError>> {
        move |c: &DiffChunk| {
            std::future::ready(if c.index == bad_index {
                Err(transient())
            } else {
                Ok(PartialSummary {
                    index: c.index,
                    paths: c.paths(),
                    text: format!("summary {}", c.index),
                    placeholder: false,
                })
            })
        }
    }

    #[tokio::test]
    async fn placeholder_mode_degrades_only_the_failed_chunk() {
        let chunks = vec![chunk(0, "a.rs"), chunk(1, "b.rs"), chunk(2, "c.rs")];
        let partials =
            summarize_chunks_with(failing_at(1), &chunks, 2, FailureMode::Placeholder)
                .await
                .unwrap();
        assert_eq!(partials.len(), 3);
        assert_eq!(partials[0].text, "summary 0");
        assert_eq!(partials[2].text, "summary 2");
        assert!(!partials[0].placeholder);
        assert!(!partials[2].placeholder);
        assert!(partials[1].placeholder);
        assert!(partials[1].text.contains("b.rs"));
        // Order holds even though completion order is unordered.
        let indices: Vec<usize> = partials.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn fatal_mode_fails_the_run_on_one_bad_chunk() {
        let chunks = vec![chunk(0, "a.rs"), chunk(1, "b.rs"), chunk(2, "c.rs")];
        let err = summarize_chunks_with(failing_at(1), &chunks, 2, FailureMode::Fatal)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Summarize(SummarizeError::Transient { .. })));
    }

    #[test]
    fn placeholder_is_marked_and_attributed() {
        let err = SummarizeError::Transient {
            status: Some(503),
            reason: "server error".into(),
        };
        let p = PartialSummary::placeholder(2, vec!["a.rs".into(), "b.rs".into()], &err);
        assert!(p.placeholder);
        assert_eq!(p.index, 2);
        assert!(p.text.contains("a.rs, b.rs"));
        assert!(p.text.contains("summary unavailable"));
    }
}
