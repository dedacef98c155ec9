//! Second-stage aggregation of partial summaries.

use tracing::debug;

use crate::errors::{Error, RunResult};
use crate::summarize::client::SummarizationClient;
use crate::summarize::{FinalSummary, PartialSummary};

/// Builds the total-summary input: partials concatenated in chunk order
/// with their file attribution, placeholders included verbatim so the
/// final summary can acknowledge the gap.
///
/// Fails with [`Error::AllChunksFailed`] when there is nothing real to
/// aggregate — the total-summary endpoint is never called with empty input.
pub fn build_total_input(partials: &[PartialSummary]) -> RunResult<String> {
    if partials.is_empty() || partials.iter().all(|p| p.placeholder) {
        return Err(Error::AllChunksFailed);
    }
    let mut input = String::new();
    for p in partials {
        input.push_str(&format!("## Chunk {} ({})\n", p.index + 1, p.paths.join(", ")));
        input.push_str(&p.text);
        input.push_str("\n\n");
    }
    Ok(input)
}

/// Join point of the pipeline: one total-summary call over all partials.
pub async fn aggregate(
    client: &SummarizationClient,
    partials: &[PartialSummary],
) -> RunResult<FinalSummary> {
    let input = build_total_input(partials)?;
    debug!(
        partials = partials.len(),
        placeholders = partials.iter().filter(|p| p.placeholder).count(),
        input_bytes = input.len(),
        "aggregating partial summaries"
    );
    Ok(client.summarize_total(&input).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SummarizeError;

    fn partial(index: usize, path: &str, text: &str) -> PartialSummary {
        PartialSummary {
            index,
            paths: vec![path.to_string()],
            text: text.to_string(),
            placeholder: false,
        }
    }

    fn failed(index: usize, path: &str) -> PartialSummary {
        let err = SummarizeError::Transient {
            status: Some(503),
            reason: "server error".into(),
        };
        PartialSummary::placeholder(index, vec![path.to_string()], &err)
    }

    #[test]
    fn all_placeholders_fail_without_a_total_call() {
        let partials = vec![failed(0, "a.rs"), failed(1, "b.rs")];
        assert!(matches!(
            build_total_input(&partials),
            Err(Error::AllChunksFailed)
        ));
    }

    #[test]
    fn empty_input_fails_the_same_way() {
        assert!(matches!(build_total_input(&[]), Err(Error::AllChunksFailed)));
    }

    #[test]
    fn input_preserves_order_and_attribution() {
        let partials = vec![
            partial(0, "a.rs", "first summary"),
            failed(1, "b.rs"),
            partial(2, "c.rs", "third summary"),
        ];
        let input = build_total_input(&partials).unwrap();
        assert!(input.contains("## Chunk 1 (a.rs)"));
        assert!(input.contains("## Chunk 2 (b.rs)"));
        assert!(input.contains("## Chunk 3 (c.rs)"));
        assert!(input.contains("summary unavailable for b.rs"));
        let a = input.find("first summary").unwrap();
        let c = input.find("third summary").unwrap();
        assert!(a < c);
    }
}
