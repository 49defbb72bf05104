//! Dotted value paths used by input references and conditions.
//!
//! A path such as `$context.user.id` or `results.fetch.items` is parsed once
//! into a [`ValuePath`]: a root namespace plus the keys to walk beneath it.
//! A first segment that is not a known root is treated as a key of the
//! execution context, so `$user.id` and `$context.user.id` are equivalent.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespace a path is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathRoot {
    /// The execution's shared context map.
    Context,
    /// Raw step results keyed by step id.
    Results,
    /// Result of the most recently completed step.
    PreviousStep,
}

impl PathRoot {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathRoot::Context => "context",
            PathRoot::Results => "results",
            PathRoot::PreviousStep => "previousStep",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "context" => Some(PathRoot::Context),
            "results" => Some(PathRoot::Results),
            "previousStep" => Some(PathRoot::PreviousStep),
            _ => None,
        }
    }
}

/// A parsed, validated path into execution state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ValuePath {
    pub root: PathRoot,
    pub segments: Vec<String>,
}

/// Errors produced when parsing a path string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty reference")]
    Empty,

    #[error("reference '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("reference '{0}' contains whitespace")]
    Whitespace(String),
}

impl ValuePath {
    /// Parse a path, with or without the leading `$`.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let body = raw.strip_prefix('$').unwrap_or(raw);
        if body.is_empty() {
            return Err(PathError::Empty);
        }
        if body.chars().any(char::is_whitespace) {
            return Err(PathError::Whitespace(raw.to_string()));
        }

        let parts: Vec<String> = body.split('.').map(str::to_string).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(PathError::EmptySegment(raw.to_string()));
        }

        Ok(Self::rooted(parts))
    }

    /// Build a path from already-split keys. Keys may contain dots; the
    /// first one picks the root as in [`ValuePath::parse`].
    pub fn from_segments(mut parts: Vec<String>) -> Result<Self, PathError> {
        if let Some(first) = parts.first_mut() {
            if let Some(stripped) = first.strip_prefix('$') {
                *first = stripped.to_string();
            }
        }
        if parts.iter().all(|p| p.is_empty()) {
            return Err(PathError::Empty);
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(PathError::EmptySegment(parts.join(".")));
        }
        Ok(Self::rooted(parts))
    }

    fn rooted(mut parts: Vec<String>) -> Self {
        let root = match parts.first().and_then(|p| PathRoot::from_segment(p)) {
            Some(root) => {
                parts.remove(0);
                root
            }
            None => PathRoot::Context,
        };
        Self {
            root,
            segments: parts,
        }
    }

    /// Parse a `$`-reference. Returns `None` when `raw` is not a reference.
    pub fn parse_reference(raw: &str) -> Option<Result<Self, PathError>> {
        raw.starts_with('$').then(|| Self::parse(raw))
    }

    pub fn context(segments: &[&str]) -> Self {
        Self {
            root: PathRoot::Context,
            segments: segments.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.root.as_str())?;
        for segment in &self.segments {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for ValuePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ValuePath> for String {
    fn from(path: ValuePath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_context_root() {
        let path = ValuePath::parse("$context.a.b").unwrap();
        assert_eq!(path.root, PathRoot::Context);
        assert_eq!(path.segments, vec!["a", "b"]);
    }

    #[test]
    fn bare_first_segment_is_context_key() {
        let path = ValuePath::parse("$user.id").unwrap();
        assert_eq!(path, ValuePath::context(&["user", "id"]));
    }

    #[test]
    fn parses_results_and_previous_step() {
        let path = ValuePath::parse("results.fetch.items").unwrap();
        assert_eq!(path.root, PathRoot::Results);
        assert_eq!(path.segments, vec!["fetch", "items"]);

        let path = ValuePath::parse("$previousStep.status").unwrap();
        assert_eq!(path.root, PathRoot::PreviousStep);
        assert_eq!(path.segments, vec!["status"]);
    }

    #[test]
    fn root_only_path_has_no_segments() {
        let path = ValuePath::parse("$results").unwrap();
        assert_eq!(path.root, PathRoot::Results);
        assert!(path.segments.is_empty());
    }

    #[test]
    fn rejects_malformed_paths() {
        assert_eq!(ValuePath::parse("$"), Err(PathError::Empty));
        assert!(matches!(
            ValuePath::parse("$a..b"),
            Err(PathError::EmptySegment(_))
        ));
        assert!(matches!(
            ValuePath::parse("$a.b."),
            Err(PathError::EmptySegment(_))
        ));
        assert!(matches!(
            ValuePath::parse("$a b"),
            Err(PathError::Whitespace(_))
        ));
    }

    #[test]
    fn from_segments_keeps_dotted_keys() {
        let parts = vec!["results".to_string(), "v1.2".to_string(), "ok".to_string()];
        let path = ValuePath::from_segments(parts).unwrap();
        assert_eq!(path.root, PathRoot::Results);
        assert_eq!(path.segments, vec!["v1.2", "ok"]);

        let path = ValuePath::from_segments(vec!["$user".to_string()]).unwrap();
        assert_eq!(path, ValuePath::context(&["user"]));

        assert_eq!(ValuePath::from_segments(Vec::new()), Err(PathError::Empty));
        assert!(matches!(
            ValuePath::from_segments(vec!["a".to_string(), String::new()]),
            Err(PathError::EmptySegment(_))
        ));
    }

    #[test]
    fn parse_reference_ignores_plain_strings() {
        assert!(ValuePath::parse_reference("hello").is_none());
        assert!(ValuePath::parse_reference("$x").unwrap().is_ok());
    }

    #[test]
    fn display_normalizes_root() {
        let path = ValuePath::parse("$user.id").unwrap();
        assert_eq!(path.to_string(), "context.user.id");
    }

    #[test]
    fn serde_uses_string_form() {
        let path = ValuePath::parse("results.fetch").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"results.fetch\"");

        let parsed: ValuePath = serde_json::from_str("\"$context.x\"").unwrap();
        assert_eq!(parsed, ValuePath::context(&["x"]));

        assert!(serde_json::from_str::<ValuePath>("\"a..b\"").is_err());
    }
}
