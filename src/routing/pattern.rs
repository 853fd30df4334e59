//! Path patterns and captured parameters.
//!
//! Patterns are `/`-separated segments: literals, `:name` captures and an
//! optional trailing `*` (or `*name`) that swallows the rest of the path.

use std::fmt;

/// Path parameters captured by a route match, in pattern order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    inner: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the value for a parameter by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(Option<String>),
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compile `raw`. Empty segments (doubled or trailing slashes) are ignored.
    pub fn parse(raw: &str) -> Self {
        let parts: Vec<&str> = split(raw).collect();
        let last = parts.len().saturating_sub(1);
        let segments = parts
            .iter()
            .enumerate()
            .map(|(i, part)| match part.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => match part.strip_prefix('*') {
                    Some(name) if i == last => {
                        Segment::Wildcard((!name.is_empty()).then(|| name.to_string()))
                    }
                    _ => Segment::Literal(part.to_string()),
                },
            })
            .collect();

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of literal segments. More literals = more specific.
    pub fn specificity(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    fn has_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard(_)))
    }

    /// Sort key: higher sorts first.
    pub(crate) fn rank(&self) -> (usize, bool, usize) {
        (
            self.specificity(),
            !self.has_wildcard(),
            self.segments.len(),
        )
    }

    /// Match `path`, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut params = Params::new();
        let mut parts = split(path);

        for segment in &self.segments {
            match segment {
                Segment::Literal(expected) => {
                    if parts.next()? != expected {
                        return None;
                    }
                }
                Segment::Param(name) => params.push(name.as_str(), parts.next()?),
                Segment::Wildcard(name) => {
                    let rest: Vec<&str> = parts.by_ref().collect();
                    if let Some(name) = name {
                        params.push(name.as_str(), rest.join("/"));
                    }
                    return Some(params);
                }
            }
        }

        match parts.next() {
            Some(_) => None,
            None => Some(params),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
