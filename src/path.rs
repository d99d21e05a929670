//! Field paths over JSON values.
//!
//! A [`FieldPath`] is an ordered list of object keys and array indices. It
//! renders as a dotted string (`items.0.name`), parses from dotted or
//! bracketed input (`items[0].name`), and can be built from the JSON Pointer
//! locations reported by the schema validator.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PathError;

/// One step in a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Key(k) => f.write_str(k),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Location of a field inside a request source.
///
/// Serializes as the raw segment array (`["items", 0, "name"]`), which is the
/// shape the `detailed` error format exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// The empty path, addressing the whole value.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// Append an object key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(PathSegment::Key(key.into()));
        self
    }

    /// Append an array index.
    pub fn index(mut self, index: usize) -> Self {
        self.0.push(PathSegment::Index(index));
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Dotted rendering; the root path renders as an empty string.
    pub fn dotted(&self) -> String {
        self.0
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Parse a dotted path, accepting bracketed indices.
    ///
    /// `""` is the root path. `a.b`, `a[0].b` and `[1]` are valid;
    /// `a..b`, `a[x]` and `a[0` are not.
    ///
    /// # Errors
    ///
    /// Returns `PathError` describing the first malformed segment.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let mut segments = Vec::new();
        if input.is_empty() {
            return Ok(Self::root());
        }

        for (position, part) in input.split('.').enumerate() {
            let (name, mut rest) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };

            // Only a leading segment may start directly with an index.
            if name.is_empty() && (rest.is_empty() || position > 0) {
                return Err(PathError::EmptySegment {
                    path: input.to_string(),
                });
            }
            if !name.is_empty() {
                if name.contains(']') {
                    return Err(PathError::UnexpectedCharacter {
                        path: input.to_string(),
                        character: ']',
                    });
                }
                segments.push(PathSegment::Key(name.to_string()));
            }

            while !rest.is_empty() {
                if !rest.starts_with('[') {
                    let character = rest.chars().next().unwrap_or(']');
                    return Err(PathError::UnexpectedCharacter {
                        path: input.to_string(),
                        character,
                    });
                }
                let close = rest.find(']').ok_or_else(|| PathError::UnclosedBracket {
                    path: input.to_string(),
                })?;
                let raw = &rest[1..close];
                let index = raw.parse::<usize>().map_err(|_| PathError::InvalidIndex {
                    path: input.to_string(),
                    index: raw.to_string(),
                })?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
            }
        }

        Ok(Self(segments))
    }

    /// Build a path from an RFC 6901 JSON Pointer reported against `instance`.
    ///
    /// Tokens that address an array element in `instance` become
    /// [`PathSegment::Index`]; everything else is a key.
    pub fn from_pointer(pointer: &str, instance: &Value) -> Self {
        let trimmed = pointer.trim_start_matches('#');
        if trimmed.is_empty() {
            return Self::root();
        }

        let mut current = Some(instance);
        let mut segments = Vec::new();
        for token in trimmed.trim_start_matches('/').split('/') {
            let key = token.replace("~1", "/").replace("~0", "~");
            match current {
                Some(Value::Array(items)) => match key.parse::<usize>() {
                    Ok(index) => {
                        current = items.get(index);
                        segments.push(PathSegment::Index(index));
                    }
                    Err(_) => {
                        current = None;
                        segments.push(PathSegment::Key(key));
                    }
                },
                Some(Value::Object(map)) => {
                    current = map.get(&key);
                    segments.push(PathSegment::Key(key));
                }
                _ => {
                    current = None;
                    segments.push(PathSegment::Key(key));
                }
            }
        }
        Self(segments)
    }

    /// Look up the value this path addresses.
    ///
    /// Numeric keys also address array elements, so `items.0` and `items[0]`
    /// resolve to the same place.
    pub fn resolve<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.0.iter().try_fold(value, |current, segment| match (segment, current) {
            (PathSegment::Key(k), Value::Object(map)) => map.get(k),
            (PathSegment::Key(k), Value::Array(items)) => {
                k.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i),
            (PathSegment::Index(i), Value::Object(map)) => map.get(&i.to_string()),
            _ => None,
        })
    }

    /// Whether this path addresses an existing value in `value`.
    pub fn exists_in(&self, value: &Value) -> bool {
        self.resolve(value).is_some()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

impl From<Vec<PathSegment>> for FieldPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl std::str::FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
