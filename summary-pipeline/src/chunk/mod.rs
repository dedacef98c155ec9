//! Greedy diff chunking under a byte budget.
//!
//! Whole file diffs are packed into the current chunk while the running
//! size stays within budget; a file larger than the budget is split
//! internally at line boundaries (never mid-line), each sub-chunk still
//! tagged with the owning path. Chunk order is file order, then sub-chunk
//! order, and the output is byte-identical across runs for the same input.

use tracing::debug;

use crate::diff::FileDiff;
use crate::errors::{ConfigError, RunResult};

/// A path-attributed slice of one file's diff inside a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPart {
    pub path: String,
    pub text: String,
}

/// An ordered, size-bounded batch of diff content. Consumed exactly once
/// by the summarization client; `index` drives deterministic reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffChunk {
    pub index: usize,
    pub parts: Vec<ChunkPart>,
}

impl DiffChunk {
    pub fn byte_len(&self) -> usize {
        self.parts.iter().map(|p| p.text.len()).sum()
    }

    /// Distinct owning paths in part order.
    pub fn paths(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for p in &self.parts {
            if !out.iter().any(|x| x == &p.path) {
                out.push(p.path.clone());
            }
        }
        out
    }

    /// Concatenated chunk text submitted to the summarizer.
    pub fn combined_text(&self) -> String {
        let mut s = String::with_capacity(self.byte_len());
        for p in &self.parts {
            s.push_str(&p.text);
        }
        s
    }
}

/// Packs file diffs into chunks of at most `max_chunk_bytes`.
///
/// Binary files carry no content and are skipped. A single line longer
/// than the budget is never split; it forms an oversized single-part
/// chunk on its own.
pub fn chunk(files: &[FileDiff], max_chunk_bytes: usize) -> RunResult<Vec<DiffChunk>> {
    if max_chunk_bytes == 0 {
        return Err(ConfigError::ZeroChunkBudget.into());
    }

    let mut chunks: Vec<DiffChunk> = Vec::new();
    let mut cur: Vec<ChunkPart> = Vec::new();
    let mut cur_len = 0usize;

    for f in files {
        if f.is_binary || f.text.is_empty() {
            continue;
        }

        if f.text.len() > max_chunk_bytes {
            // Oversized file: close the running chunk, then emit line-safe
            // sub-chunks. The final sub-chunk starts the next running chunk
            // so small trailing files can still pack with it.
            flush(&mut chunks, &mut cur, &mut cur_len);
            let parts = split_line_safe(&f.text, max_chunk_bytes);
            let last = parts.len() - 1;
            for (i, text) in parts.into_iter().enumerate() {
                if i == last {
                    cur_len = text.len();
                    cur.push(ChunkPart {
                        path: f.path.clone(),
                        text,
                    });
                } else {
                    let index = chunks.len();
                    chunks.push(DiffChunk {
                        index,
                        parts: vec![ChunkPart {
                            path: f.path.clone(),
                            text,
                        }],
                    });
                }
            }
        } else {
            if cur_len + f.text.len() > max_chunk_bytes {
                flush(&mut chunks, &mut cur, &mut cur_len);
            }
            cur_len += f.text.len();
            cur.push(ChunkPart {
                path: f.path.clone(),
                text: f.text.clone(),
            });
        }
    }
    flush(&mut chunks, &mut cur, &mut cur_len);

    debug!(
        files = files.len(),
        chunks = chunks.len(),
        budget = max_chunk_bytes,
        "diff chunked"
    );
    Ok(chunks)
}

fn flush(chunks: &mut Vec<DiffChunk>, cur: &mut Vec<ChunkPart>, cur_len: &mut usize) {
    if !cur.is_empty() {
        let index = chunks.len();
        chunks.push(DiffChunk {
            index,
            parts: std::mem::take(cur),
        });
        *cur_len = 0;
    }
}

/// Splits text into pieces of at most `max` bytes, cutting only at line
/// boundaries. `split_inclusive` keeps terminators so the concatenation of
/// pieces is byte-identical to the input.
fn split_line_safe(text: &str, max: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    for line in text.split_inclusive('\n') {
        if !cur.is_empty() && cur.len() + line.len() > max {
            parts.push(std::mem::take(&mut cur));
        }
        cur.push_str(line);
    }
    if !cur.is_empty() {
        parts.push(cur);
    }
    parts
}
