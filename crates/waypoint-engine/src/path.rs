//! Dotted/bracketed addresses into a JSON document.
//!
//! # Syntax
//!
//! - `$` : the document root
//! - `a.b.c` : nested field access
//! - `items[0].name` : array index access, indices may chain (`grid[1][2]`)
//! - `$.a.b` : an explicit root prefix is accepted and ignored

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while parsing a path string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,

    #[error("invalid path '{path}': {reason}")]
    Syntax { path: String, reason: String },
}

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{name}"),
            PathSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// A parsed document address. The empty segment list is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    /// The root path `$`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from pre-parsed segments.
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Parse a path string.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        if trimmed == "$" {
            return Ok(Self::root());
        }
        let body = trimmed
            .strip_prefix("$.")
            .or_else(|| trimmed.strip_prefix('$'))
            .unwrap_or(trimmed);

        let syntax = |reason: &str| PathError::Syntax {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        for part in body.split('.') {
            if part.is_empty() {
                return Err(syntax("empty segment"));
            }
            let (name, mut rest) = match part.find('[') {
                Some(bracket) => (&part[..bracket], &part[bracket..]),
                None => (part, ""),
            };
            if name.contains(']') || name.chars().any(char::is_whitespace) {
                return Err(syntax("invalid field name"));
            }
            if !name.is_empty() {
                segments.push(PathSegment::Field(name.to_string()));
            } else if segments.is_empty() && !body.starts_with('[') {
                return Err(syntax("empty field name"));
            }
            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(|| syntax("unclosed '['"))?;
                let index = rest[1..close]
                    .parse::<usize>()
                    .map_err(|_| syntax("array index must be a non-negative integer"))?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(syntax("unexpected characters after ']'"));
                }
            }
        }

        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// A new path with `segment` appended.
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    /// Resolve this path against a JSON value.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        resolve_segments(root, &self.segments)
    }
}

/// Walk `segments` from `root`, returning `None` at the first absent step.
pub(crate) fn resolve_segments<'a>(root: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = navigate_segment(current, segment)?;
    }
    Some(current)
}

/// Navigate one segment through a JSON value.
pub(crate) fn navigate_segment<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match segment {
        PathSegment::Field(name) => value.as_object()?.get(name),
        PathSegment::Index(i) => value.as_array()?.get(*i),
    }
}

/// Render segments in canonical form (`a.b[0]`, root as `$`).
pub(crate) fn render_segments(segments: &[PathSegment]) -> String {
    if segments.is_empty() {
        return "$".to_string();
    }
    let mut out = String::new();
    for segment in segments {
        match segment {
            PathSegment::Field(name) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(name);
            }
            PathSegment::Index(i) => {
                if out.is_empty() {
                    out.push('$');
                }
                out.push_str(&format!("[{i}]"));
            }
        }
    }
    out
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_segments(&self.segments))
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str) -> PathSegment {
        PathSegment::Field(name.to_string())
    }

    #[test]
    fn test_parse_root() {
        assert!(Path::parse("$").unwrap().is_root());
        assert!(Path::parse(" $ ").unwrap().is_root());
    }

    #[test]
    fn test_parse_dotted() {
        let path = Path::parse("a.b.c").unwrap();
        assert_eq!(path.segments(), &[field("a"), field("b"), field("c")]);
    }

    #[test]
    fn test_parse_root_prefix() {
        assert_eq!(Path::parse("$.a.b").unwrap(), Path::parse("a.b").unwrap());
    }

    #[test]
    fn test_parse_indices() {
        let path = Path::parse("items[2][0].name").unwrap();
        assert_eq!(
            path.segments(),
            &[
                field("items"),
                PathSegment::Index(2),
                PathSegment::Index(0),
                field("name")
            ]
        );
    }

    #[test]
    fn test_parse_root_index() {
        let path = Path::parse("$[1]").unwrap();
        assert_eq!(path.segments(), &[PathSegment::Index(1)]);
        assert_eq!(path.to_string(), "$[1]");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Path::parse(""), Err(PathError::Empty));
        assert!(Path::parse("a..b").is_err());
        assert!(Path::parse("a[x]").is_err());
        assert!(Path::parse("a[1").is_err());
        assert!(Path::parse("a[-1]").is_err());
        assert!(Path::parse("a[0]b").is_err());
        assert!(Path::parse("a b").is_err());
    }

    #[test]
    fn test_display_canonical() {
        assert_eq!(Path::parse("$.a[0].b").unwrap().to_string(), "a[0].b");
        assert_eq!(Path::root().to_string(), "$");
    }

    #[test]
    fn test_resolve() {
        let doc = json!({"a": {"items": [{"name": "x"}, {"name": "y"}]}});
        let path = Path::parse("a.items[1].name").unwrap();
        assert_eq!(path.resolve(&doc), Some(&json!("y")));
        assert_eq!(Path::parse("a.items[5]").unwrap().resolve(&doc), None);
        assert_eq!(Path::parse("a.missing").unwrap().resolve(&doc), None);
        assert_eq!(Path::root().resolve(&doc), Some(&doc));
    }

    #[test]
    fn test_resolve_index_on_object_is_absent() {
        let doc = json!({"a": {"0": 1}});
        assert_eq!(Path::parse("a[0]").unwrap().resolve(&doc), None);
    }

    #[test]
    fn test_serde_as_string() {
        let path: Path = serde_json::from_value(json!("a.b[3]")).unwrap();
        assert_eq!(serde_json::to_value(&path).unwrap(), json!("a.b[3]"));
        assert!(serde_json::from_value::<Path>(json!("a[")).is_err());
    }
}
