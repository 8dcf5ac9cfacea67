//! # Path Patterns
//!
//! Parses route patterns like `/users/{id}/posts` into ordered segments and
//! matches them against request paths.
//!
//! Matching is exact-arity: a pattern only matches paths with the same number
//! of non-empty segments. Literal segments compare case-sensitively, parameter
//! segments match anything and capture the raw segment text.

use std::fmt;

/// A single segment of a route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the path segment exactly
    Literal(String),
    /// Matches any path segment and binds it to this name
    Parameter(String),
}

impl Segment {
    /// Classify one non-empty pattern segment.
    ///
    /// A segment is a parameter only when a single pair of braces wraps the
    /// whole segment. Anything else, including unbalanced braces, is literal.
    fn classify(raw: &str) -> Self {
        let name = raw
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .filter(|inner| !inner.is_empty() && !inner.contains(['{', '}']));

        match name {
            Some(name) => Self::Parameter(name.to_string()),
            None => Self::Literal(raw.to_string()),
        }
    }
}

/// A parsed, immutable route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    source: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Parse a pattern string.
    ///
    /// Empty segments are dropped, so leading, trailing and repeated slashes
    /// carry no meaning. Parsing never fails.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        Self {
            source: pattern.to_string(),
            segments: split_path(pattern).map(Segment::classify).collect(),
        }
    }

    /// The pattern string this was parsed from
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed segments in order
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Parameter names in declaration order
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Parameter(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a request path against this pattern.
    ///
    /// Returns the captured parameters in declaration order, or `None` on the
    /// first mismatching segment or when the segment counts differ.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = split_path(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = PathParams::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(text) if text == part => {}
                Segment::Literal(_) => return None,
                Segment::Parameter(name) => params.push(name.clone(), part.to_string()),
            }
        }
        Some(params)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Non-empty `/`-separated segments of a path
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Path parameters captured by a match, kept in pattern declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    entries: Vec<(String, String)>,
}

impl PathParams {
    fn push(&mut self, name: String, value: String) {
        self.entries.push((name, value));
    }

    /// Look a parameter up by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Values in declaration order, the form handlers receive them in
    #[must_use]
    pub fn positional(&self) -> Vec<String> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    /// Iterate over `(name, value)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of captured parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
