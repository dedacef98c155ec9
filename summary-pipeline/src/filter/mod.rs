//! Path filtering against allow/deny glob sets.
//!
//! Semantics:
//! - Deny wins unconditionally.
//! - Empty allow list means "allow everything not denied".
//! - Non-empty allow list requires at least one allow match.
//!
//! Matching is case-sensitive and anchored to the full relative path;
//! `*` does not cross `/` boundaries, `**` matches recursively. Decisions
//! are pure so the same filter feeds both the summarization stage and the
//! audit report.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ConfigError, RunResult};

/// Filter config file shape: `{"allow": [glob...], "deny": [glob...]}`.
///
/// A missing file is equivalent to the default (allow everything).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl FilterConfig {
    /// Loads the optional filter config from the repository root.
    ///
    /// Absent file ⇒ `Default`. A file that exists but cannot be read or
    /// parsed is a `ConfigError`: the run must abort instead of silently
    /// mis-filtering.
    pub fn load(path: &Path) -> RunResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no filter config; allowing all paths");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::FilterConfig {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let cfg: FilterConfig =
            serde_json::from_str(&raw).map_err(|e| ConfigError::FilterConfig {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(
            allow = cfg.allow.len(),
            deny = cfg.deny.len(),
            "filter config loaded"
        );
        Ok(cfg)
    }
}

/// Which rule determined a filter decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedRule {
    /// A deny pattern matched.
    Deny,
    /// An allow pattern matched (and no deny pattern did).
    Allow,
    /// Allow list is empty and nothing denied the path.
    DefaultAllow,
    /// Allow list is non-empty and no pattern matched.
    NoAllowMatch,
}

/// One path's filter outcome, kept for the audit table.
#[derive(Debug, Clone)]
pub struct FilterDecision {
    pub path: String,
    pub included: bool,
    pub rule: MatchedRule,
}

/// Compiled allow/deny matcher.
#[derive(Debug)]
pub struct PathFilter {
    allow: Option<GlobSet>,
    deny: Option<GlobSet>,
}

impl PathFilter {
    /// Compiles the config into glob sets.
    ///
    /// Any malformed pattern aborts with a `ConfigError` naming it.
    pub fn new(cfg: &FilterConfig) -> RunResult<Self> {
        Ok(Self {
            allow: compile_globset(&cfg.allow)?,
            deny: compile_globset(&cfg.deny)?,
        })
    }

    /// Pure inclusion predicate over a repo-relative path.
    pub fn should_include(&self, path: &str) -> bool {
        self.decide(path).included
    }

    /// Inclusion decision plus the rule that produced it.
    pub fn decide(&self, path: &str) -> FilterDecision {
        let normalized = to_unix_sep(path);
        if let Some(deny) = &self.deny {
            if deny.is_match(&*normalized) {
                return FilterDecision {
                    path: path.to_string(),
                    included: false,
                    rule: MatchedRule::Deny,
                };
            }
        }
        match &self.allow {
            None => FilterDecision {
                path: path.to_string(),
                included: true,
                rule: MatchedRule::DefaultAllow,
            },
            Some(allow) if allow.is_match(&*normalized) => FilterDecision {
                path: path.to_string(),
                included: true,
                rule: MatchedRule::Allow,
            },
            Some(_) => FilterDecision {
                path: path.to_string(),
                included: false,
                rule: MatchedRule::NoAllowMatch,
            },
        }
    }

    /// Rename-aware inclusion: a renamed file passes if either side passes.
    pub fn include_changed(&self, old_path: Option<&str>, new_path: &str) -> bool {
        if self.should_include(new_path) {
            return true;
        }
        old_path.is_some_and(|p| p != new_path && self.should_include(p))
    }
}

/// Audit artifact: ordered passed/blocked path lists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterReport {
    pub passed: Vec<String>,
    pub blocked: Vec<String>,
}

impl FilterReport {
    /// Records one decision, de-duplicating while preserving first-seen order.
    pub fn record(&mut self, path: &str, included: bool) {
        let bucket = if included {
            &mut self.passed
        } else {
            &mut self.blocked
        };
        if !bucket.iter().any(|p| p == path) {
            bucket.push(path.to_string());
        }
    }
}

/// Compiles a pattern list into a `GlobSet`; `None` for an empty list.
///
/// Unlike lenient scanners that skip bad patterns, a pattern that fails to
/// compile is a hard error here: mis-filtering would corrupt both the
/// summary scope and the audit report.
fn compile_globset(patterns: &[String]) -> RunResult<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        if pat.trim().is_empty() {
            continue;
        }
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: pat.clone(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|e| ConfigError::InvalidPattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })?;
    Ok(Some(set))
}

/// Normalizes Windows-style separators so globs see `/` only.
fn to_unix_sep(path: &str) -> std::borrow::Cow<'_, str> {
    if path.contains('\\') {
        std::borrow::Cow::Owned(path.replace('\\', "/"))
    } else {
        std::borrow::Cow::Borrowed(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    fn filter(allow: &[&str], deny: &[&str]) -> PathFilter {
        let cfg = FilterConfig {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
        };
        PathFilter::new(&cfg).unwrap()
    }

    #[test]
    fn empty_config_allows_everything() {
        let f = filter(&[], &[]);
        for p in ["src/app.py", "README.md", "a/b/c/d.rs"] {
            let d = f.decide(p);
            assert!(d.included);
            assert_eq!(d.rule, MatchedRule::DefaultAllow);
        }
    }

    #[test]
    fn deny_wins_over_allow() {
        let f = filter(&["src/**"], &["src/vendor/**"]);
        let d = f.decide("src/vendor/x.js");
        assert!(!d.included);
        assert_eq!(d.rule, MatchedRule::Deny);
        assert!(f.should_include("src/app.py"));
    }

    #[test]
    fn non_empty_allow_requires_a_match() {
        let f = filter(&["docs/**"], &[]);
        let d = f.decide("src/app.py");
        assert!(!d.included);
        assert_eq!(d.rule, MatchedRule::NoAllowMatch);
        assert!(f.should_include("docs/guide.md"));
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let f = filter(&[], &["*.md"]);
        assert!(!f.should_include("README.md"));
        // "*.md" is anchored to the root segment; nested files are untouched.
        assert!(f.should_include("docs/guide.md"));
    }

    #[test]
    fn mixed_allow_deny_partitions_paths() {
        let f = filter(&["src/**"], &["*.md"]);
        let mut report = FilterReport::default();
        for p in ["src/app.py", "README.md", "src/vendor/x.js"] {
            report.record(p, f.should_include(p));
        }
        assert_eq!(report.passed, vec!["src/app.py", "src/vendor/x.js"]);
        assert_eq!(report.blocked, vec!["README.md"]);
    }

    #[test]
    fn rename_passes_when_either_side_passes() {
        let f = filter(&["src/**"], &[]);
        assert!(f.include_changed(Some("src/old.rs"), "legacy/new.rs"));
        assert!(f.include_changed(None, "src/new.rs"));
        assert!(!f.include_changed(Some("legacy/old.rs"), "legacy/new.rs"));
    }

    #[test]
    fn malformed_pattern_is_a_config_error() {
        let cfg = FilterConfig {
            allow: vec!["src/[".to_string()],
            deny: vec![],
        };
        match PathFilter::new(&cfg) {
            Err(Error::Config(ConfigError::InvalidPattern { pattern, .. })) => {
                assert_eq!(pattern, "src/[");
            }
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn backslash_paths_are_normalized() {
        let f = filter(&["src/**"], &[]);
        assert!(f.should_include("src\\app.py"));
    }

    #[test]
    fn report_deduplicates_preserving_order() {
        let mut report = FilterReport::default();
        report.record("a.rs", true);
        report.record("b.rs", true);
        report.record("a.rs", true);
        assert_eq!(report.passed, vec!["a.rs", "b.rs"]);
    }
}
