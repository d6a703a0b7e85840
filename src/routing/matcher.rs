//! Route matching logic.
//!
//! # Responsibilities
//! - Match a request path against a prefix on a segment boundary
//!
//! # Design Decisions
//! - Only the path takes part in matching; scheme, host and query never do
//! - Path matching is case-sensitive
//! - No regex to guarantee O(n) matching

use std::fmt::Debug;

/// Trait for matching request paths.
pub trait Matcher: Send + Sync + Debug {
    /// Returns true if the path matches this condition.
    fn matches(&self, path: &str) -> bool;

    /// Ordering key: more specific matchers are tried first.
    fn specificity(&self) -> usize;
}

/// Matches a path prefix on a segment boundary.
///
/// `/releases` matches `/releases`, `/releases/` and `/releases/x`, but not
/// `/releasesx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher. A trailing `/` is ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        Self {
            prefix: trimmed.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        if self.prefix.is_empty() {
            "/"
        } else {
            &self.prefix
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    fn specificity(&self) -> usize {
        self.prefix.len()
    }
}
