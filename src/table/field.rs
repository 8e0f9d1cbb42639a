//! Field identifiers and nested-path lookup.

use crate::Document;

/// Separator used when flattening a nested path into an index row key.
/// Mirrors composite-key building elsewhere: segments cannot contain NUL.
const PATH_SEP: char = '\0';

/// Identifies a field within a row document.
///
/// A `Name` addresses a top-level key and is used as-is. A `Path` addresses
/// a nested value and is normalized by joining its segments, so identical
/// semantic paths always map to identical index keys regardless of how the
/// caller spelled them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    /// Top-level field name
    Name(String),
    /// Nested lookup path, walked depth-first
    Path(Vec<String>),
}

impl Field {
    /// Normalized form used as the index row key.
    pub fn key(&self) -> String {
        match self {
            Field::Name(name) => name.clone(),
            Field::Path(segments) => segments.join(&PATH_SEP.to_string()),
        }
    }

    /// Inverse of [`key`](Field::key), used when re-discovering persisted
    /// indexes on open.
    pub fn from_key(key: &str) -> Self {
        if key.contains(PATH_SEP) {
            Field::Path(key.split(PATH_SEP).map(str::to_string).collect())
        } else {
            Field::Name(key.to_string())
        }
    }

    /// Resolves this field within `doc`.
    ///
    /// Path lookups walk depth-first and return `None` on any missing
    /// segment instead of failing.
    pub fn lookup<'a>(&self, doc: &'a Document) -> Option<&'a Document> {
        match self {
            Field::Name(name) => doc.get(name),
            Field::Path(segments) => {
                let mut current = doc;
                for segment in segments {
                    current = current.get(segment)?;
                }
                Some(current)
            }
        }
    }
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Field::Name(name.to_string())
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        Field::Name(name)
    }
}

impl From<(&str, &str)> for Field {
    fn from((a, b): (&str, &str)) -> Self {
        Field::Path(vec![a.to_string(), b.to_string()])
    }
}

impl From<(&str, &str, &str)> for Field {
    fn from((a, b, c): (&str, &str, &str)) -> Self {
        Field::Path(vec![a.to_string(), b.to_string(), c.to_string()])
    }
}

impl From<Vec<String>> for Field {
    fn from(segments: Vec<String>) -> Self {
        Field::Path(segments)
    }
}

impl From<&[&str]> for Field {
    fn from(segments: &[&str]) -> Self {
        Field::Path(segments.iter().map(|s| s.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn name_key_passes_through() {
        let field: Field = "title".into();
        assert_eq!(field.key(), "title");
        assert_eq!(Field::from_key("title"), field);
    }

    #[test]
    fn path_key_roundtrips() {
        let field: Field = ("deep", "key").into();
        let key = field.key();
        assert_eq!(Field::from_key(&key), field);
    }

    #[test]
    fn name_lookup() {
        let doc = json!({"title": "x"});
        let field: Field = "title".into();
        assert_eq!(field.lookup(&doc), Some(&json!("x")));
    }

    #[test]
    fn path_lookup_walks_nested_maps() {
        let doc = json!({"deep": {"key": 10}});
        let field: Field = ("deep", "key").into();
        assert_eq!(field.lookup(&doc), Some(&json!(10)));
    }

    #[test]
    fn missing_segment_returns_none() {
        let doc = json!({"deep": {"key": 10}});
        let field: Field = ("deep", "missing", "more").into();
        assert_eq!(field.lookup(&doc), None);
    }
}
