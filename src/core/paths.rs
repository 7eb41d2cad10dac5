//! Endpoint identifiers and slash-delimited namespace paths.
//!
//! A `NamespacePath` addresses one artifact in the shared store. Paths are
//! rooted at an endpoint and may carry a single `*` wildcard segment that is
//! resolved against the live tree at check time.

use std::fmt;

use regex::Regex;

use crate::core::errors::{FchError, Result};

/// Scheme prefix accepted (and stripped) when normalizing raw endpoint ids.
const ID_SCHEME: &str = "ns:";

/// Opaque normalized identifier for a managed endpoint.
///
/// Normalization is idempotent: feeding an already-normalized id back through
/// [`EndpointId::new`] yields the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(String);

impl EndpointId {
    /// Normalize a free-form id string: trim whitespace, strip an optional
    /// `ns:` scheme and any leading/trailing slashes.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let without_scheme = trimmed.strip_prefix(ID_SCHEME).unwrap_or(trimmed);
        Self(without_scheme.trim_matches('/').to_string())
    }

    /// The normalized id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Root namespace path for this endpoint.
    #[must_use]
    pub fn root(&self) -> NamespacePath {
        NamespacePath::new(&self.0)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A slash-delimited path addressing an object in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacePath {
    segments: Vec<String>,
}

impl NamespacePath {
    /// Parse a path, collapsing empty segments. Idempotent: re-parsing the
    /// rendered form of a path yields an equal path.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self {
            segments: raw
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Append a (possibly multi-segment) suffix.
    #[must_use]
    pub fn join(&self, suffix: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(
            suffix
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        Self { segments }
    }

    /// Parent path, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Final segment, or `None` at the root.
    #[must_use]
    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Path segments in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether any segment is the `*` wildcard marker.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| s == "*")
    }

    /// Split a wildcarded path into the literal prefix before the wildcard
    /// and an end-anchored matcher for the full pattern.
    ///
    /// Returns `None` for paths without a wildcard segment.
    pub fn split_wildcard(&self) -> Result<Option<WildcardPattern>> {
        let Some(star) = self.segments.iter().position(|s| s == "*") else {
            return Ok(None);
        };

        let prefix = Self {
            segments: self.segments[..star].to_vec(),
        };

        // Suffix match anchored at the end, mirroring how checks locate
        // dynamically-named directories: the candidate's tail must match the
        // declared pattern with `*` standing for exactly one segment.
        let translated: Vec<String> = self
            .segments
            .iter()
            .map(|s| {
                if s == "*" {
                    "[^/]+".to_string()
                } else {
                    regex::escape(s)
                }
            })
            .collect();
        let pattern =
            Regex::new(&format!("{}$", translated.join("/"))).map_err(|e| FchError::Runtime {
                details: format!("wildcard pattern for {self}: {e}"),
            })?;

        Ok(Some(WildcardPattern { prefix, pattern }))
    }
}

impl fmt::Display for NamespacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Result of splitting a wildcarded path: enumerate under `prefix`, keep
/// candidates whose rendered path matches `pattern`.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    /// Literal segments before the first `*`.
    pub prefix: NamespacePath,
    /// End-anchored matcher for the full pattern.
    pub pattern: Regex,
}

impl WildcardPattern {
    /// Whether a concrete path matches the declared pattern.
    #[must_use]
    pub fn matches(&self, candidate: &NamespacePath) -> bool {
        self.pattern.is_match(&candidate.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_id_normalization_is_idempotent() {
        let first = EndpointId::new(" ns://C.4f3c8a1b/ ");
        let second = EndpointId::new(first.as_str());
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "C.4f3c8a1b");
    }

    #[test]
    fn endpoint_id_accepts_already_clean_input() {
        assert_eq!(EndpointId::new("C.0011aabb").as_str(), "C.0011aabb");
    }

    #[test]
    fn path_parsing_collapses_empty_segments() {
        let path = NamespacePath::new("//fs//os/proc/");
        assert_eq!(path.to_string(), "fs/os/proc");
        assert_eq!(NamespacePath::new(&path.to_string()), path);
    }

    #[test]
    fn join_splits_multi_segment_suffixes() {
        let root = EndpointId::new("C.1").root();
        let path = root.join("fs/os").join("proc");
        assert_eq!(path.to_string(), "C.1/fs/os/proc");
        assert_eq!(path.segments().len(), 4);
    }

    #[test]
    fn parent_walks_up_to_root() {
        let path = NamespacePath::new("a/b/c");
        let parent = path.parent().unwrap();
        assert_eq!(parent.to_string(), "a/b");
        assert_eq!(parent.parent().unwrap().to_string(), "a");
        assert!(parent.parent().unwrap().parent().unwrap().parent().is_none());
    }

    #[test]
    fn wildcard_split_yields_prefix_and_matcher() {
        let path = NamespacePath::new("fs/tsk/*/proc");
        let wildcard = path.split_wildcard().unwrap().unwrap();
        assert_eq!(wildcard.prefix.to_string(), "fs/tsk");

        assert!(wildcard.matches(&NamespacePath::new("C.1/fs/tsk/sda1/proc")));
        assert!(!wildcard.matches(&NamespacePath::new("C.1/fs/tsk/sda1/etc")));
        // `*` stands for exactly one segment.
        assert!(!wildcard.matches(&NamespacePath::new("C.1/fs/tsk/a/b/proc")));
    }

    #[test]
    fn wildcard_pattern_is_anchored_at_the_end() {
        let path = NamespacePath::new("fs/tsk/*/proc");
        let wildcard = path.split_wildcard().unwrap().unwrap();
        assert!(!wildcard.matches(&NamespacePath::new("C.1/fs/tsk/sda1/proc/child")));
    }

    #[test]
    fn literal_segments_are_escaped() {
        let path = NamespacePath::new("fs/a.b/*/c");
        let wildcard = path.split_wildcard().unwrap().unwrap();
        assert!(wildcard.matches(&NamespacePath::new("C.1/fs/a.b/x/c")));
        assert!(!wildcard.matches(&NamespacePath::new("C.1/fs/aXb/x/c")));
    }

    #[test]
    fn non_wildcard_path_splits_to_none() {
        assert!(
            NamespacePath::new("fs/os/proc")
                .split_wildcard()
                .unwrap()
                .is_none()
        );
    }
}
