//! Diff acquisition and per-file splitting.
//!
//! The pipeline runs inside an already-checked-out CI workspace, so the
//! diff comes straight from the `git` binary (`git diff <target>...<source>`)
//! rather than a provider REST API. The raw unified output is then cut on
//! `diff --git` boundaries into immutable [`FileDiff`]s, preserving git's
//! file ordering. Binary patches keep an empty body plus a flag so the
//! chunker skips them.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::{DiffError, RunResult};

/// One changed file's textual diff. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Path on the new side (`b/`); equals `old_path` unless renamed.
    pub path: String,
    /// Path on the old side (`a/`), kept for rename-aware filtering.
    pub old_path: String,
    /// Full per-file unified diff text; empty for binary patches.
    pub text: String,
    pub is_binary: bool,
}

impl FileDiff {
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }

    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }
}

/// Runs `git diff <target_ref>...<source_ref>` and splits the output.
///
/// Fails with [`DiffError::Unavailable`] when either ref cannot be resolved
/// (shallow clones missing history are the usual culprit) — fatal for the
/// run, no partial diff is produced. An empty diff yields an empty vec.
pub async fn acquire(
    repo_dir: &Path,
    source_ref: &str,
    target_ref: &str,
    timeout: Duration,
) -> RunResult<Vec<FileDiff>> {
    let range = format!("{target_ref}...{source_ref}");
    debug!(%range, repo = %repo_dir.display(), "running git diff");

    let mut cmd = Command::new("git");
    cmd.args(["diff", &range])
        .current_dir(repo_dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| DiffError::Timeout)?
        .map_err(|e| DiffError::Unavailable(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DiffError::Unavailable(format!(
            "git diff {range} failed (exit {}): {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        ))
        .into());
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let files = split_file_diffs(&raw);
    debug!(
        files = files.len(),
        bytes = raw.len(),
        "diff acquired and split per file"
    );
    Ok(files)
}

/// Splits a raw unified diff into per-file blocks on `diff --git` headers.
///
/// Blocks with an unparseable header are dropped with a warning rather than
/// aborting the run; git does not emit such blocks in practice.
pub fn split_file_diffs(raw: &str) -> Vec<FileDiff> {
    let mut blocks: Vec<String> = Vec::new();
    let mut cur = String::new();
    for line in raw.split_inclusive('\n') {
        if line.starts_with("diff --git ") && !cur.is_empty() {
            blocks.push(std::mem::take(&mut cur));
        }
        cur.push_str(line);
    }
    if !cur.trim().is_empty() {
        blocks.push(cur);
    }

    let mut files = Vec::with_capacity(blocks.len());
    for block in blocks {
        let Some(header) = block.lines().next() else {
            continue;
        };
        let Some((old_path, path)) = parse_git_header(header) else {
            warn!(header, "skipping diff block with unparseable header");
            continue;
        };
        let is_binary = looks_like_binary_patch(&block);
        files.push(FileDiff {
            path,
            old_path,
            text: if is_binary { String::new() } else { block },
            is_binary,
        });
    }
    files
}

/// Parses `diff --git a/<old> b/<new>` into `(old, new)`.
fn parse_git_header(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("diff --git ")?;
    let idx = rest.find(" b/")?;
    let old = rest[..idx].strip_prefix("a/").unwrap_or(&rest[..idx]);
    let new = rest[idx + 3..].trim_end();
    if new.is_empty() {
        return None;
    }
    Some((old.to_string(), new.to_string()))
}

/// Heuristics for binary patches in git unified output.
fn looks_like_binary_patch(block: &str) -> bool {
    block.lines().any(|l| {
        l.starts_with("GIT binary patch") || (l.starts_with("Binary files ") && l.ends_with("differ"))
    })
}

/// Elides hunk bodies of an oversized file diff, keeping headers intact.
///
/// Used before chunking when a single file exceeds the chunk budget by so
/// much that even split sub-chunks would drown the summarizer; the hunk
/// headers still tell it where the changes happened.
pub fn simplify_oversized(text: &str) -> String {
    const ELISION: &str = "{changes too large to summarize; omitted}\n";
    let mut out = String::with_capacity(text.len() / 4);
    let mut in_hunk = false;
    for line in text.split_inclusive('\n') {
        if line.starts_with("@@") {
            out.push_str(line);
            if !line.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(ELISION);
            in_hunk = true;
        } else if line.starts_with("diff --git ") {
            out.push_str(line);
            in_hunk = false;
        } else if !in_hunk {
            out.push_str(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FILES: &str = "diff --git a/src/app.py b/src/app.py\n\
index 111..222 100644\n\
--- a/src/app.py\n\
+++ b/src/app.py\n\
@@ -1,2 +1,3 @@\n\
 context\n\
+added line\n\
 more\n\
diff --git a/README.md b/README.md\n\
index 333..444 100644\n\
--- a/README.md\n\
+++ b/README.md\n\
@@ -1 +1 @@\n\
-old\n\
+new\n";

    #[test]
    fn splits_per_file_preserving_order() {
        let files = split_file_diffs(TWO_FILES);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "src/app.py");
        assert_eq!(files[1].path, "README.md");
        assert!(files[0].text.starts_with("diff --git a/src/app.py"));
        assert!(files[0].text.contains("+added line"));
        assert_eq!(files[0].line_count(), 8);
        assert!(!files[0].is_binary);
    }

    #[test]
    fn empty_input_yields_no_files() {
        assert!(split_file_diffs("").is_empty());
        assert!(split_file_diffs("\n\n").is_empty());
    }

    #[test]
    fn binary_patch_has_empty_body_and_flag() {
        let raw = "diff --git a/logo.png b/logo.png\n\
index 111..222 100644\n\
Binary files a/logo.png and b/logo.png differ\n";
        let files = split_file_diffs(raw);
        assert_eq!(files.len(), 1);
        assert!(files[0].is_binary);
        assert!(files[0].text.is_empty());
    }

    #[test]
    fn rename_header_keeps_both_paths() {
        let raw = "diff --git a/src/old_name.rs b/src/new_name.rs\n\
similarity index 95%\n\
rename from src/old_name.rs\n\
rename to src/new_name.rs\n";
        let files = split_file_diffs(raw);
        assert_eq!(files[0].old_path, "src/old_name.rs");
        assert_eq!(files[0].path, "src/new_name.rs");
    }

    #[test]
    fn simplify_keeps_headers_drops_bodies() {
        let one = &split_file_diffs(TWO_FILES)[0].text;
        let simplified = simplify_oversized(one);
        assert!(simplified.contains("diff --git a/src/app.py"));
        assert!(simplified.contains("@@ -1,2 +1,3 @@"));
        assert!(simplified.contains("omitted"));
        assert!(!simplified.contains("+added line"));
        assert!(!simplified.contains(" context"));
    }
}
